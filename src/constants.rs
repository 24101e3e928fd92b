//! Shared constants used across the application.

/// User agent sent with API and media requests.
pub const USER_AGENT: &str = concat!("linkedin-post-archiver/", env!("CARGO_PKG_VERSION"));

/// LinkedIn REST API version header value.
pub const LINKEDIN_API_VERSION: &str = "202401";

/// Rest.li protocol version header value.
pub const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Largest page the posts listing endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 50;

/// File name of the post record inside each post directory.
pub const POST_RECORD_FILE: &str = "post.md";

/// Subdirectory of a post directory holding its media files.
pub const MEDIA_DIR: &str = "media";

/// File name of the archive index in the base directory.
pub const INDEX_FILE: &str = "INDEX.md";
