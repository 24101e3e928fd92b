//! One end-to-end archive run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use super::index::rebuild_index;
use super::render::{parse_front_matter, render_post};
use super::stats::{RunReport, RunState};
use crate::auth::{AuthState, Credential, TokenManager};
use crate::client::RateLimitedClient;
use crate::config::Config;
use crate::constants::POST_RECORD_FILE;
use crate::error::{ArchiveError, Result};
use crate::fs_utils::write_atomic;
use crate::media::MediaDownloader;
use crate::posts::{base_slug, slug_candidate, FetchedItem, Post, PostFetcher};

/// Per-run options from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this many valid posts.
    pub limit: Option<usize>,
    /// Run the authorization flow even if a cached credential exists.
    pub reauthorize: bool,
}

/// Who, if anyone, holds a candidate slug directory.
enum SlotOwner {
    Vacant,
    Post(String),
    /// A record exists but its id cannot be read.
    Unknown,
}

pub struct ArchiveOrchestrator {
    config: Config,
    state: RunState,
    report: RunReport,
}

impl ArchiveOrchestrator {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: RunState::Idle,
            report: RunReport::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counts so far; after an aborted run this is the partial report.
    #[must_use]
    pub fn report(&self) -> RunReport {
        self.report
    }

    /// Authenticate, archive every post not yet on disk, rebuild the index.
    ///
    /// Per-post and per-media failures are counted in the report. Anything
    /// else aborts the run.
    ///
    /// # Errors
    ///
    /// Returns the systemic error that aborted the run.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport> {
        self.state = RunState::Idle;
        self.report = RunReport::default();

        self.transition(RunState::Authenticating);
        let credential = match self.authenticate(options.reauthorize).await {
            Ok(credential) => credential,
            Err(e) => return Err(self.abort(e)),
        };

        let client = match RateLimitedClient::new(&self.config, credential) {
            Ok(client) => client,
            Err(e) => return Err(self.abort(e)),
        };
        let downloader = match MediaDownloader::new(&self.config) {
            Ok(downloader) => downloader,
            Err(e) => return Err(self.abort(e)),
        };

        self.transition(RunState::Fetching);
        let result = self.archive_posts(&client, &downloader, options.limit).await;
        self.report.api_requests = client.request_count();
        if let Err(e) = result {
            if self.report.archived > 0 {
                self.refresh_index_after_abort().await;
            }
            return Err(self.abort(e));
        }

        self.transition(RunState::Reporting);
        match rebuild_index(&self.config.output.base_dir, Utc::now()).await {
            Ok(count) => info!(posts = count, "Index updated"),
            Err(e) => return Err(self.abort(e)),
        }

        self.report.log();
        self.transition(RunState::Done);
        Ok(self.report)
    }

    async fn authenticate(&self, reauthorize: bool) -> Result<Credential> {
        let mut tokens = TokenManager::new(&self.config)?;
        if reauthorize {
            return tokens.reauthorize().await;
        }

        match tokens.load_cached().await {
            AuthState::Authenticated(credential) => Ok(credential.clone()),
            AuthState::Expired(credential) => Err(ArchiveError::Auth(format!(
                "cached access token expired at {}; run with --reauth",
                credential.expires_at
            ))),
            AuthState::Unauthenticated | AuthState::Authorizing => Err(ArchiveError::Auth(
                "no cached access token; run with --auth first".to_string(),
            )),
        }
    }

    async fn archive_posts(
        &mut self,
        client: &RateLimitedClient,
        downloader: &MediaDownloader,
        limit: Option<usize>,
    ) -> Result<()> {
        let profile = client.get_profile().await?;
        let author_urn = profile.author_urn()?;
        info!(author = %author_urn, "Fetching posts");

        let fetcher = PostFetcher::new(client);
        let posts = fetcher.fetch_posts(&author_urn, limit);
        futures_util::pin_mut!(posts);

        while let Some(item) = posts.next().await {
            let item = item?;
            self.report.posts_seen += 1;
            match item {
                FetchedItem::Invalid(e) => {
                    warn!(error = %e, "Post counted as failed");
                    self.report.failed += 1;
                }
                FetchedItem::Post(post) => {
                    self.transition(RunState::Persisting);
                    self.persist(*post, downloader).await?;
                    self.transition(RunState::Fetching);
                }
            }
        }
        Ok(())
    }

    /// Place `post` under a unique slug and write it, unless it is already
    /// archived.
    async fn persist(&mut self, mut post: Post, downloader: &MediaDownloader) -> Result<()> {
        let (year, month) = post.year_month();
        let month_dir = self.config.output.base_dir.join(year).join(month);
        let base = base_slug(&post.content, post.created_at);

        let mut n = 1;
        let post_dir = loop {
            let slug = slug_candidate(&base, n);
            let dir = month_dir.join(&slug);
            match slot_owner(&dir.join(POST_RECORD_FILE)).await? {
                SlotOwner::Post(id) if id == post.id => {
                    debug!(post_id = %post.id, slug = %slug, "Already archived");
                    self.report.skipped += 1;
                    return Ok(());
                }
                SlotOwner::Post(_) | SlotOwner::Unknown => n += 1,
                SlotOwner::Vacant => {
                    post.slug = Some(slug);
                    break dir;
                }
            }
        };

        if !post.media.is_empty() {
            let summary = downloader.download_all(&mut post, &post_dir).await;
            self.report.add_media(summary);
        }

        let record = post_dir.join(POST_RECORD_FILE);
        write_atomic(&record, render_post(&post, Utc::now()).as_bytes()).await?;
        self.report.archived += 1;
        info!(
            post_id = %post.id,
            slug = post.slug.as_deref().unwrap_or_default(),
            kind = %post.kind,
            "Archived post"
        );
        Ok(())
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid run transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }

    /// Best-effort index rebuild for posts written before a run aborted.
    async fn refresh_index_after_abort(&self) {
        match rebuild_index(&self.config.output.base_dir, Utc::now()).await {
            Ok(count) => info!(posts = count, "Index updated before abort"),
            Err(e) => warn!(error = %e, "Failed to update index after aborted run"),
        }
    }

    fn abort(&mut self, error: ArchiveError) -> ArchiveError {
        error!(state = %self.state, error = %error, "Archive run aborted");
        self.report.log();
        self.transition(RunState::Aborted);
        error
    }
}

async fn slot_owner(record: &Path) -> Result<SlotOwner> {
    match tokio::fs::read_to_string(record).await {
        Ok(text) => Ok(parse_front_matter(&text).map_or(SlotOwner::Unknown, |f| SlotOwner::Post(f.id))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SlotOwner::Vacant),
        Err(e) => Err(ArchiveError::filesystem(PathBuf::from(record), e)),
    }
}
