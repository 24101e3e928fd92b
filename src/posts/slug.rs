//! Date-prefixed slugs for post directories.

use chrono::{DateTime, Utc};
use regex::Regex;

/// Slugs never exceed this many characters, date prefix included.
pub const MAX_SLUG_LEN: usize = 60;

const MAX_WORDS: usize = 8;

// URLs, hashtags and mentions carry no meaning in a directory name
static NOISE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"https?://\S+|[#@]\w+").unwrap());

/// Base slug: `YYYY-MM-DD` followed by up to eight leading words of the
/// content, lower-cased, with everything but ASCII letters and digits
/// removed.
#[must_use]
pub fn base_slug(content: &str, created_at: DateTime<Utc>) -> String {
    let date = created_at.format("%Y-%m-%d").to_string();
    let cleaned = NOISE.replace_all(content, " ");

    let words: Vec<String> = cleaned
        .split_whitespace()
        .take(MAX_WORDS)
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect();

    if words.is_empty() {
        return date;
    }

    let mut slug = format!("{date}-{}", words.join("-"));
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// The `n`th candidate for `base`: `base` itself for 1, then `base-2`,
/// `base-3` and so on.
#[must_use]
pub fn slug_candidate(base: &str, n: u32) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}
