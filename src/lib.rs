//! LinkedIn post archiver library.
//!
//! Authorizes against LinkedIn with OAuth 2.0 + PKCE, walks the member's posts
//! through a rate-limited API client, downloads attached media, and writes
//! each post once as a markdown record under `<year>/<month>/<slug>/`.

pub mod archiver;
pub mod auth;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod fs_utils;
pub mod media;
pub mod posts;

pub use error::{ArchiveError, MediaError, Result, ValidationError};
