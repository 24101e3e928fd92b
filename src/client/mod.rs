//! Rate-limited gateway to the LinkedIn REST API.
//!
//! Every request goes through [`RateLimitedClient::call`], which applies the
//! request spacing of [`RequestThrottle`] to each attempt and retries
//! transient failures under the configured [`RetryPolicy`].

mod retry;
mod throttle;

pub use retry::{with_retry, IsRetryable, RetryPolicy};
pub use throttle::RequestThrottle;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::Credential;
use crate::config::Config;
use crate::constants::{LINKEDIN_API_VERSION, MAX_PAGE_SIZE, RESTLI_PROTOCOL_VERSION, USER_AGENT};
use crate::error::{ArchiveError, Result};

/// Identity returned by the OpenID userinfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Profile {
    /// The `urn:li:person:<sub>` URN used to list this member's posts.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Api`] if the profile has no `sub`.
    pub fn author_urn(&self) -> Result<String> {
        match self.sub.as_deref() {
            Some(sub) if !sub.is_empty() => Ok(format!("urn:li:person:{sub}")),
            _ => Err(ArchiveError::Api {
                status: 200,
                message: "profile response has no member id".to_string(),
            }),
        }
    }
}

/// One page of the posts listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostsPage {
    #[serde(default)]
    pub elements: Vec<Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total: Option<u32>,
}

pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    credential: Credential,
    throttle: RequestThrottle,
    retry: RetryPolicy,
    requests: AtomicU64,
}

impl RateLimitedClient {
    /// # Errors
    ///
    /// Returns [`ArchiveError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &Config, credential: Credential) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ArchiveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.linkedin.api_base_url.trim_end_matches('/').to_string(),
            credential,
            throttle: RequestThrottle::new(config.rate_limit_delay()),
            retry: config.retry_policy(),
            requests: AtomicU64::new(0),
        })
    }

    /// Requests sent so far, retries included.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// GET `endpoint` and decode the JSON body.
    ///
    /// Parameter values are appended to the query string as given, so callers
    /// must percent-encode anything that needs it. Rest.li list syntax such as
    /// `List(...)` has to stay unencoded.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Auth`] if the credential has expired or is rejected
    /// - [`ArchiveError::RateLimitExceeded`] / [`ArchiveError::Server`] once
    ///   retries are exhausted
    /// - [`ArchiveError::Network`] on connection failure after retries
    /// - [`ArchiveError::Api`] for any other unexpected response
    pub async fn call(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint, params);
        with_retry(&self.retry, |attempt| self.attempt(&url, attempt)).await
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<Value> {
        if self.credential.is_expired() {
            return Err(ArchiveError::Auth(format!(
                "access token expired at {}",
                self.credential.expires_at
            )));
        }

        self.throttle.wait().await;
        let request = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(url = %url, attempt, request, "API request");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.credential.access_token)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .header("LinkedIn-Version", LINKEDIN_API_VERSION)
            .send()
            .await
            .map_err(|e| ArchiveError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ArchiveError::Auth(
                "access token was rejected (HTTP 401)".to_string(),
            ));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ArchiveError::RateLimitExceeded {
                status: status.as_u16(),
                attempts: attempt,
            });
        }
        if status.is_server_error() {
            return Err(ArchiveError::Server {
                status: status.as_u16(),
                attempts: attempt,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::Network(e.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_slice(&body).map_err(|e| ArchiveError::Api {
            status: status.as_u16(),
            message: format!("invalid JSON body: {e}"),
        })
    }

    fn endpoint_url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    /// Fetch the authenticated member's profile.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::call`].
    pub async fn get_profile(&self) -> Result<Profile> {
        let value = self.call("userinfo", &[]).await?;
        let profile: Profile = serde_json::from_value(value).map_err(|e| ArchiveError::Api {
            status: 200,
            message: format!("unexpected profile shape: {e}"),
        })?;
        info!(name = profile.name.as_deref().unwrap_or("unknown"), "Retrieved profile");
        Ok(profile)
    }

    /// Fetch one page of posts authored by `author_urn`.
    ///
    /// `count` is clamped to the API maximum of 50.
    ///
    /// # Errors
    ///
    /// See [`RateLimitedClient::call`].
    pub async fn get_posts_page(&self, author_urn: &str, start: u32, count: u32) -> Result<PostsPage> {
        let count = count.clamp(1, MAX_PAGE_SIZE);
        let params = [
            ("q", "authors".to_string()),
            ("authors", format!("List({})", urlencoding::encode(author_urn))),
            ("start", start.to_string()),
            ("count", count.to_string()),
        ];
        let value = self.call("ugcPosts", &params).await?;
        serde_json::from_value(value).map_err(|e| ArchiveError::Api {
            status: 200,
            message: format!("unexpected posts page shape: {e}"),
        })
    }
}
