use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::client::RetryPolicy;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Upper bound for any configured delay or backoff, in seconds.
const MAX_DELAY_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration.
///
/// Loaded from a TOML file whose sections mirror the fields below; every key
/// is optional. OAuth client credentials normally come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub linkedin: LinkedInConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub output: OutputConfig,
}

/// API client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkedInConfig {
    /// Minimum seconds between the starts of two API requests.
    pub rate_limit_delay: f64,
    /// Total attempts per request, the first one included.
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// First backoff delay in seconds; doubles on each retry.
    pub initial_backoff: f64,
    /// Upper bound for a single backoff delay in seconds.
    pub max_backoff: f64,
    pub api_base_url: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: 1.5,
            max_retries: 3,
            timeout: 30,
            initial_backoff: 1.0,
            max_backoff: 60.0,
            api_base_url: "https://api.linkedin.com/v2".to_string(),
        }
    }
}

/// OAuth settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub token_cache_path: PathBuf,
    /// Seconds to wait for the browser redirect.
    pub callback_timeout: u64,
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            token_cache_path: PathBuf::from("cache/token.json"),
            callback_timeout: 300,
            scopes: ["openid", "profile", "email", "w_member_social"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Media download policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub download_images: bool,
    pub download_videos: bool,
    pub download_documents: bool,
    pub max_video_size_mb: u64,
    pub max_concurrent_downloads: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            download_images: true,
            download_videos: true,
            download_documents: true,
            max_video_size_mb: 500,
            max_concurrent_downloads: 4,
        }
    }
}

/// Output layout settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("archive"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load [`DEFAULT_CONFIG_PATH`] if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Overlay values from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is present but malformed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(id) = optional_env("LINKEDIN_CLIENT_ID") {
            self.auth.client_id = id;
        }
        if let Some(secret) = optional_env("LINKEDIN_CLIENT_SECRET") {
            self.auth.client_secret = secret;
        }
        if let Some(uri) = optional_env("LINKEDIN_REDIRECT_URI") {
            self.auth.redirect_uri = uri;
        }
        if let Some(dir) = optional_env("ARCHIVE_BASE_DIR") {
            self.output.base_dir = PathBuf::from(dir);
        }
        self.linkedin.max_retries = parse_env_u32("LINKEDIN_MAX_RETRIES", self.linkedin.max_retries)?;
        self.linkedin.timeout = parse_env_u64("LINKEDIN_TIMEOUT", self.linkedin.timeout)?;
        self.media.download_videos = parse_env_bool("DOWNLOAD_VIDEOS", self.media.download_videos)?;
        self.media.max_video_size_mb =
            parse_env_u64("MAX_VIDEO_SIZE_MB", self.media.max_video_size_mb)?;
        Ok(())
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.linkedin.max_retries == 0 {
            return Err(invalid("linkedin.max_retries", "must be at least 1"));
        }
        if self.linkedin.timeout == 0 {
            return Err(invalid("linkedin.timeout", "must be at least 1 second"));
        }
        for (name, value) in [
            ("linkedin.rate_limit_delay", self.linkedin.rate_limit_delay),
            ("linkedin.initial_backoff", self.linkedin.initial_backoff),
            ("linkedin.max_backoff", self.linkedin.max_backoff),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, "must be a non-negative number of seconds"));
            }
            if value > MAX_DELAY_SECS {
                return Err(invalid(name, "must not exceed one day (86400 seconds)"));
            }
        }
        if self.linkedin.max_backoff < self.linkedin.initial_backoff {
            return Err(invalid(
                "linkedin.max_backoff",
                "must not be smaller than linkedin.initial_backoff",
            ));
        }
        if url::Url::parse(&self.linkedin.api_base_url).is_err() {
            return Err(invalid("linkedin.api_base_url", "must be an absolute URL"));
        }
        if url::Url::parse(&self.auth.redirect_uri).is_err() {
            return Err(invalid("auth.redirect_uri", "must be an absolute URL"));
        }
        if self.auth.callback_timeout == 0 {
            return Err(invalid("auth.callback_timeout", "must be at least 1 second"));
        }
        if self.media.max_concurrent_downloads == 0 {
            return Err(invalid("media.max_concurrent_downloads", "must be at least 1"));
        }
        if self.output.base_dir.as_os_str().is_empty() {
            return Err(invalid("output.base_dir", "cannot be empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        seconds(self.linkedin.rate_limit_delay)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.linkedin.timeout)
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.callback_timeout)
    }

    /// Retry policy shared by API calls and media downloads.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.linkedin.max_retries,
            seconds(self.linkedin.initial_backoff),
            seconds(self.linkedin.max_backoff),
        )
    }

    /// Configuration with short delays and local paths, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            linkedin: LinkedInConfig {
                rate_limit_delay: 0.0,
                timeout: 5,
                initial_backoff: 0.01,
                max_backoff: 0.1,
                api_base_url: "http://127.0.0.1:9/v2".to_string(),
                ..LinkedInConfig::default()
            },
            auth: AuthConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                token_cache_path: PathBuf::from("./test-data/token.json"),
                callback_timeout: 5,
                ..AuthConfig::default()
            },
            media: MediaConfig::default(),
            output: OutputConfig {
                base_dir: PathBuf::from("./test-data/archive"),
            },
        }
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Seconds as a [`Duration`], saturating at [`MAX_DELAY_SECS`]. Anything
/// negative or not a number becomes zero.
fn seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.min(MAX_DELAY_SECS)).unwrap_or_default()
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
