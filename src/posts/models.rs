use std::fmt;

use chrono::{DateTime, Utc};

/// What a post is, decided once when the raw record is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostKind {
    Original,
    Repost {
        original_post_url: Option<String>,
        commentary: Option<String>,
    },
    Article {
        url: Option<String>,
        title: Option<String>,
    },
    Poll {
        question: Option<String>,
        options: Vec<String>,
    },
}

impl PostKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Repost { .. } => "repost",
            Self::Article { .. } => "article",
            Self::Poll { .. } => "poll",
        }
    }
}

impl fmt::Display for PostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    /// Kind implied by a file extension (without the dot), if unambiguous.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" => Some(Self::Image),
            "mp4" | "mov" | "avi" => Some(Self::Video),
            "pdf" | "doc" | "docx" => Some(Self::Document),
            _ => None,
        }
    }

    /// Extension used when neither the URL nor the response says otherwise.
    #[must_use]
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Image => ".jpg",
            Self::Video => ".mp4",
            Self::Document => ".pdf",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attachment of a post.
///
/// `local_path` is relative to the post directory and is only set once the
/// file has been downloaded and verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
    pub local_path: Option<String>,
    pub filename: Option<String>,
}

impl Media {
    #[must_use]
    pub fn new(kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            local_path: None,
            filename: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub url: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub kind: PostKind,
    pub media: Vec<Media>,
    /// Lower-cased, without `#`, in order of first appearance.
    pub hashtags: Vec<String>,
    /// Assigned by the orchestrator before the post is written.
    pub slug: Option<String>,
}

impl Post {
    #[must_use]
    pub fn original_post_url(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Repost {
                original_post_url, ..
            } => original_post_url.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn repost_commentary(&self) -> Option<&str> {
        match &self.kind {
            PostKind::Repost { commentary, .. } => commentary.as_deref(),
            _ => None,
        }
    }

    /// `YYYY` and `MM` directory names for this post (UTC).
    #[must_use]
    pub fn year_month(&self) -> (String, String) {
        (
            self.created_at.format("%Y").to_string(),
            self.created_at.format("%m").to_string(),
        )
    }
}
