//! Raw UGC post records to typed [`Post`] values.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::models::{Media, MediaKind, Post, PostKind};
use crate::error::ValidationError;

const SHARE_CONTENT: &str = "com.linkedin.ugc.ShareContent";

/// Public URL of a post given its URN.
#[must_use]
pub fn post_url(urn: &str) -> String {
    let activity = urn.rsplit(':').next().unwrap_or(urn);
    format!("https://www.linkedin.com/feed/update/urn:li:activity:{activity}/")
}

/// Parse one element of the posts listing.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the record has no id or no creation
/// timestamp.
pub fn parse_post(raw: &Value) -> Result<Post, ValidationError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ValidationError::new(None, "missing id"))?;

    let created_at = created_at(raw)
        .ok_or_else(|| ValidationError::new(Some(id), "missing or invalid creation timestamp"))?;

    let share = raw
        .get("specificContent")
        .and_then(|c| c.get(SHARE_CONTENT))
        .unwrap_or(&Value::Null);
    let content = share
        .pointer("/shareCommentary/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let kind = classify(raw, share, &content);
    let media = if matches!(kind, PostKind::Article { .. }) {
        Vec::new()
    } else {
        extract_media(share)
    };

    Ok(Post {
        id: id.to_string(),
        url: post_url(id),
        hashtags: extract_hashtags(&content),
        content,
        created_at,
        kind,
        media,
        slug: None,
    })
}

fn created_at(raw: &Value) -> Option<DateTime<Utc>> {
    let millis = raw
        .pointer("/created/time")
        .or_else(|| raw.get("firstPublishedAt"))
        .and_then(Value::as_i64)
        .filter(|ms| *ms > 0)?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Decide the post kind: repost, then article, then poll, else original.
fn classify(raw: &Value, share: &Value, content: &str) -> PostKind {
    if let Some(reshare) = raw.get("reshareContext").filter(|v| is_present(v)) {
        return PostKind::Repost {
            original_post_url: reshare
                .get("parent")
                .and_then(Value::as_str)
                .map(post_url),
            commentary: Some(content.trim())
                .filter(|c| !c.is_empty())
                .map(ToString::to_string),
        };
    }

    let category = share.get("shareMediaCategory").and_then(Value::as_str);
    let article = share.get("article").filter(|v| is_present(v));
    if category == Some("ARTICLE") || article.is_some() {
        let first_media = share.pointer("/media/0").unwrap_or(&Value::Null);
        let url = article
            .and_then(|a| a.get("source").or_else(|| a.get("url")))
            .or_else(|| first_media.get("originalUrl"))
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let title = article
            .and_then(|a| a.get("title"))
            .or_else(|| first_media.get("title"))
            .and_then(text_of)
            .map(ToString::to_string);
        return PostKind::Article { url, title };
    }

    if let Some(poll) = share.get("poll").filter(|v| is_present(v)) {
        let question = poll.get("question").and_then(text_of).map(ToString::to_string);
        let options = poll
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(text_of)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return PostKind::Poll { question, options };
    }

    PostKind::Original
}

/// A field counts as present unless it is null or an empty object, array or
/// string.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Either a bare string or a `{"text": ...}` wrapper.
fn text_of(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("text").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Media items of a share. The category sets the default kind; a URL with a
/// recognised extension overrides it per item.
fn extract_media(share: &Value) -> Vec<Media> {
    let category_kind = match share.get("shareMediaCategory").and_then(Value::as_str) {
        Some("VIDEO") => MediaKind::Video,
        Some("DOCUMENT" | "RICH") => MediaKind::Document,
        _ => MediaKind::Image,
    };

    share
        .get("media")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("originalUrl")
                        .and_then(Value::as_str)
                        .filter(|u| !u.is_empty())
                        .or_else(|| {
                            item.pointer("/thumbnails/0/url")
                                .and_then(Value::as_str)
                                .filter(|u| !u.is_empty())
                        })
                        .map(|url| {
                            let kind = url_extension(url)
                                .and_then(MediaKind::from_extension)
                                .unwrap_or(category_kind);
                            Media::new(kind, url)
                        })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    file.rsplit_once('.').map(|(_, ext)| ext)
}

/// Hashtags in `text`, lower-cased and without `#`, first appearance first.
#[must_use]
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        if !token.starts_with('#') {
            continue;
        }
        let tag = token
            .trim_start_matches('#')
            .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
