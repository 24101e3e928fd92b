use std::fmt;

use tracing::info;

use crate::media::MediaSummary;

/// Counts accumulated over one archive run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub posts_seen: u64,
    pub archived: u64,
    pub skipped: u64,
    pub failed: u64,
    pub api_requests: u64,
    pub media_downloaded: u64,
    pub media_failed: u64,
    pub media_skipped: u64,
}

impl RunReport {
    pub fn add_media(&mut self, summary: MediaSummary) {
        self.media_downloaded += summary.downloaded as u64;
        self.media_failed += summary.failed as u64;
        self.media_skipped += summary.skipped as u64;
    }

    pub fn log(&self) {
        info!(
            posts_seen = self.posts_seen,
            archived = self.archived,
            skipped = self.skipped,
            failed = self.failed,
            api_requests = self.api_requests,
            media_downloaded = self.media_downloaded,
            media_failed = self.media_failed,
            media_skipped = self.media_skipped,
            "Archive run finished"
        );
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Posts seen:        {}", self.posts_seen)?;
        writeln!(f, "Archived:          {}", self.archived)?;
        writeln!(f, "Already archived:  {}", self.skipped)?;
        writeln!(f, "Failed:            {}", self.failed)?;
        writeln!(f, "API requests:      {}", self.api_requests)?;
        write!(
            f,
            "Media downloaded:  {} ({} failed, {} skipped)",
            self.media_downloaded, self.media_failed, self.media_skipped
        )
    }
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Authenticating,
    Fetching,
    Persisting,
    Reporting,
    Done,
    Aborted,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use RunState::{Aborted, Authenticating, Done, Fetching, Idle, Persisting, Reporting};
        match (self, next) {
            (from, Aborted) => !from.is_terminal(),
            (Idle, Authenticating)
            | (Authenticating | Persisting, Fetching)
            | (Fetching, Persisting | Reporting)
            | (Reporting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Fetching => "fetching",
            Self::Persisting => "persisting",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
