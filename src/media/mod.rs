//! Media downloads for archived posts.
//!
//! Files are streamed to a hidden `.part` sibling and renamed into
//! `media/<kind>-<n><ext>` only after the body is complete and validated, so
//! a file under its final name is always whole.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::client::{with_retry, RetryPolicy};
use crate::config::{Config, MediaConfig};
use crate::constants::{MEDIA_DIR, USER_AGENT};
use crate::error::{ArchiveError, MediaError, Result};
use crate::fs_utils::temp_path_for;
use crate::posts::{Media, MediaKind, Post};

/// Extensions kept when they appear in a media URL.
const KNOWN_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "avi", "pdf", "doc", "docx",
];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Outcome of downloading one post's media.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediaSummary {
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct MediaDownloader {
    http: reqwest::Client,
    config: MediaConfig,
    retry: RetryPolicy,
    downloaded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl MediaDownloader {
    /// # Errors
    ///
    /// Returns [`ArchiveError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        // Large videos may stream for longer than the timeout, so it bounds
        // connecting and each idle read rather than the whole transfer.
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .map_err(|e| ArchiveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config: config.media.clone(),
            retry: config.retry_policy(),
            downloaded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn downloaded_count(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Download the `index`th (1-based) media item of a post into
    /// `<post_dir>/media/`.
    ///
    /// Returns the final path. An existing non-empty file for this slot is
    /// returned without any network traffic.
    ///
    /// # Errors
    ///
    /// Returns a [`MediaError`] describing why the item was skipped or failed.
    pub async fn download(
        &self,
        media: &Media,
        index: usize,
        post_dir: &Path,
    ) -> std::result::Result<PathBuf, MediaError> {
        let result = self.download_inner(media, index, post_dir).await;
        let counter = match &result {
            Ok(_) => &self.downloaded,
            Err(e) if e.is_skip() => &self.skipped,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    async fn download_inner(
        &self,
        media: &Media,
        index: usize,
        post_dir: &Path,
    ) -> std::result::Result<PathBuf, MediaError> {
        if !self.enabled(media.kind) {
            return Err(MediaError::Disabled(media.kind.as_str()));
        }

        let media_dir = post_dir.join(MEDIA_DIR);
        let stem = format!("{}-{index}", media.kind);
        if let Some(existing) = find_existing(&media_dir, &stem).await {
            debug!(path = %existing.display(), "Media already downloaded");
            return Ok(existing);
        }

        if media.kind == MediaKind::Video {
            self.check_reported_size(&media.url).await?;
        }

        let url_extension = extension_from_url(&media.url);
        with_retry(&self.retry, |_| {
            self.fetch(media, &media_dir, &stem, url_extension.as_deref())
        })
        .await
    }

    /// Download every media item of `post` concurrently and record the
    /// results on the post.
    pub async fn download_all(&self, post: &mut Post, post_dir: &Path) -> MediaSummary {
        let limit = self.config.max_concurrent_downloads.max(1);
        let results: Vec<(usize, std::result::Result<PathBuf, MediaError>)> =
            stream::iter(post.media.iter().enumerate())
                .map(|(i, media)| async move { (i, self.download(media, i + 1, post_dir).await) })
                .buffer_unordered(limit)
                .collect()
                .await;

        let mut summary = MediaSummary::default();
        for (i, result) in results {
            let media = &mut post.media[i];
            match result {
                Ok(path) => {
                    let filename = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    media.local_path = Some(format!("{MEDIA_DIR}/{filename}"));
                    media.filename = Some(filename);
                    summary.downloaded += 1;
                }
                Err(e) if e.is_skip() => {
                    info!(post_id = %post.id, url = %media.url, reason = %e, "Skipped media");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(post_id = %post.id, url = %media.url, error = %e, "Media download failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn enabled(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.config.download_images,
            MediaKind::Video => self.config.download_videos,
            MediaKind::Document => self.config.download_documents,
        }
    }

    fn limit_bytes(&self) -> u64 {
        self.config.max_video_size_mb.saturating_mul(BYTES_PER_MB)
    }

    fn oversize(&self, bytes: u64) -> MediaError {
        let size_mb = bytes as f64 / BYTES_PER_MB as f64;
        MediaError::Oversize {
            size_mb,
            limit_mb: self.config.max_video_size_mb,
        }
    }

    /// Ask the host for the size up front. A failed probe is not an error;
    /// the limit is enforced again on the GET.
    async fn check_reported_size(&self, url: &str) -> std::result::Result<(), MediaError> {
        match self.http.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                if let Some(len) = declared_length(response.headers()) {
                    if len > self.limit_bytes() {
                        return Err(self.oversize(len));
                    }
                }
                Ok(())
            }
            Ok(response) => {
                debug!(url = %url, status = response.status().as_u16(), "HEAD probe rejected");
                Ok(())
            }
            Err(e) => {
                debug!(url = %url, error = %e, "HEAD probe failed");
                Ok(())
            }
        }
    }

    async fn fetch(
        &self,
        media: &Media,
        media_dir: &Path,
        stem: &str,
        url_extension: Option<&str>,
    ) -> std::result::Result<PathBuf, MediaError> {
        let mut response = self
            .http
            .get(&media.url)
            .send()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Http(status.as_u16()));
        }

        let is_video = media.kind == MediaKind::Video;
        if is_video {
            if let Some(len) = declared_length(response.headers()) {
                if len > self.limit_bytes() {
                    return Err(self.oversize(len));
                }
            }
        }

        let extension = url_extension
            .map(ToString::to_string)
            .or_else(|| {
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(extension_from_content_type)
            })
            .unwrap_or_else(|| media.kind.default_extension().trim_start_matches('.').to_string());

        let final_path = media_dir.join(format!("{stem}.{extension}"));
        let part_path = temp_path_for(&final_path, "part");

        tokio::fs::create_dir_all(media_dir)
            .await
            .map_err(|e| MediaError::Io(e.to_string()))?;
        let mut file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| MediaError::Io(e.to_string()))?;

        let mut written: u64 = 0;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    discard(&part_path).await;
                    return Err(MediaError::Network(e.to_string()));
                }
            };
            written += chunk.len() as u64;
            if is_video && written > self.limit_bytes() {
                discard(&part_path).await;
                return Err(self.oversize(written));
            }
            if let Err(e) = file.write_all(&chunk).await {
                discard(&part_path).await;
                return Err(MediaError::Io(e.to_string()));
            }
        }
        if let Err(e) = file.flush().await {
            discard(&part_path).await;
            return Err(MediaError::Io(e.to_string()));
        }
        drop(file);

        if written == 0 {
            discard(&part_path).await;
            return Err(MediaError::Invalid("empty response body".to_string()));
        }

        if media.kind == MediaKind::Image {
            if let Err(e) = validate_image(&part_path).await {
                discard(&part_path).await;
                return Err(e);
            }
        }

        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            discard(&part_path).await;
            return Err(MediaError::Io(e.to_string()));
        }

        debug!(path = %final_path.display(), bytes = written, "Downloaded media");
        Ok(final_path)
    }
}

/// `Content-Length` as sent by the host, HEAD responses included.
fn declared_length(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}

async fn validate_image(path: &Path) -> std::result::Result<(), MediaError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MediaError::Io(e.to_string()))?;
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|_| ()))
        .await
        .map_err(|e| MediaError::Invalid(format!("image check aborted: {e}")))?
        .map_err(|e| MediaError::Invalid(format!("not a decodable image: {e}")))
}

/// A complete earlier download of slot `stem`, whatever its extension.
async fn find_existing(media_dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(media_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) != Some(stem) {
            continue;
        }
        if crate::fs_utils::is_nonempty_file(&path).await {
            return Some(path);
        }
    }
    None
}

/// Lower-cased extension of the URL path, if it is one we recognise.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Extension for a `Content-Type` value, if it maps to one we recognise.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let candidates = mime_guess::get_mime_extensions_str(&essence)?;
    // Prefer the common spelling when the registry lists several
    for preferred in KNOWN_EXTENSIONS {
        if candidates.contains(preferred) {
            return Some((*preferred).to_string());
        }
    }
    None
}
