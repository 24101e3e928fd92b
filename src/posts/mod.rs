//! Paginated retrieval of a member's posts.

pub mod models;
pub mod parse;
pub mod slug;

pub use models::{Media, MediaKind, Post, PostKind};
pub use parse::{extract_hashtags, parse_post, post_url};
pub use slug::{base_slug, slug_candidate, MAX_SLUG_LEN};

use futures_util::Stream;
use tracing::{debug, warn};

use crate::client::RateLimitedClient;
use crate::constants::MAX_PAGE_SIZE;
use crate::error::{Result, ValidationError};

/// One element of the posts listing after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedItem {
    Post(Box<Post>),
    /// The record was malformed; fetching continues with the next one.
    Invalid(ValidationError),
}

pub struct PostFetcher<'a> {
    client: &'a RateLimitedClient,
    page_size: u32,
}

impl<'a> PostFetcher<'a> {
    #[must_use]
    pub fn new(client: &'a RateLimitedClient) -> Self {
        Self {
            client,
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Override the page size, clamped to `1..=50`.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Lazily walk the posts listing from the first page.
    ///
    /// The stream ends after a short page or once `limit` valid posts have
    /// been yielded. A systemic error is yielded once and ends the stream.
    pub fn fetch_posts(
        &self,
        author_urn: &str,
        limit: Option<usize>,
    ) -> impl Stream<Item = Result<FetchedItem>> + 'a {
        let client = self.client;
        let page_size = self.page_size;
        let author_urn = author_urn.to_string();

        async_stream::stream! {
            let mut start = 0u32;
            let mut yielded = 0usize;

            'pages: loop {
                if limit.is_some_and(|limit| yielded >= limit) {
                    break;
                }

                let page = match client.get_posts_page(&author_urn, start, page_size).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let received = page.elements.len();
                debug!(start, received, "Fetched posts page");

                for raw in &page.elements {
                    if limit.is_some_and(|limit| yielded >= limit) {
                        break 'pages;
                    }
                    match parse_post(raw) {
                        Ok(post) => {
                            yielded += 1;
                            yield Ok(FetchedItem::Post(Box::new(post)));
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed post");
                            yield Ok(FetchedItem::Invalid(e));
                        }
                    }
                }

                if received < page_size as usize {
                    break;
                }
                start += page_size;
            }
        }
    }
}
