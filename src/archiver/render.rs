//! Markdown rendering of post records.
//!
//! A record starts with a front matter block between `---` lines. Each line
//! is `key: value` where the value is a JSON scalar or array, which keeps the
//! block valid YAML while letting [`parse_front_matter`] read it back without
//! a YAML parser.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::posts::{MediaKind, Post, PostKind};

const EXCERPT_CHARS: usize = 100;

/// The machine-readable part of a post record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub id: String,
    pub slug: String,
    pub date: String,
    pub post_type: String,
    pub post_url: String,
    pub original_post_url: Option<String>,
    pub archived_at: String,
    pub tags: Vec<String>,
    pub excerpt: String,
}

/// Render `post` as a complete record.
#[must_use]
pub fn render_post(post: &Post, archived_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    render_front_matter(&mut out, post, archived_at);

    out.push_str(&format!("# {}\n\n", post.created_at.format("%B %d, %Y")));

    match &post.kind {
        PostKind::Original => push_content(&mut out, &post.content),
        PostKind::Repost {
            original_post_url,
            commentary,
        } => {
            out.push_str("## Repost\n\n");
            if let Some(url) = original_post_url {
                out.push_str(&format!("**Original post:** {url}\n\n"));
            }
            if let Some(commentary) = commentary {
                out.push_str("**My commentary:**\n\n");
                push_content(&mut out, commentary);
            }
        }
        PostKind::Article { url, title } => {
            push_content(&mut out, &post.content);
            out.push_str("## Article\n\n");
            match (title, url) {
                (Some(title), Some(url)) => out.push_str(&format!("[{title}]({url})\n\n")),
                (None, Some(url)) => out.push_str(&format!("<{url}>\n\n")),
                (Some(title), None) => out.push_str(&format!("{title}\n\n")),
                (None, None) => {}
            }
        }
        PostKind::Poll { question, options } => {
            push_content(&mut out, &post.content);
            out.push_str("## Poll\n\n");
            if let Some(question) = question {
                out.push_str(&format!("**{question}**\n\n"));
            }
            for option in options {
                out.push_str(&format!("- {option}\n"));
            }
            if !options.is_empty() {
                out.push('\n');
            }
        }
    }

    if !post.hashtags.is_empty() {
        let tags: Vec<String> = post.hashtags.iter().map(|t| format!("#{t}")).collect();
        out.push_str(&format!("**Hashtags:** {}\n\n", tags.join(" ")));
    }

    if !post.media.is_empty() {
        out.push_str("---\n\n## Media\n\n");
        for media in &post.media {
            match (&media.local_path, &media.filename) {
                (Some(path), filename) => {
                    let label = filename.as_deref().unwrap_or(path);
                    if media.kind == MediaKind::Image {
                        out.push_str(&format!("![{label}]({path})\n\n"));
                    } else {
                        out.push_str(&format!("[{label}]({path})\n\n"));
                    }
                }
                (None, _) => out.push_str(&format!(
                    "_{} not available locally: <{}>_\n\n",
                    media.kind, media.url
                )),
            }
        }
    }

    out.push_str(&format!(
        "---\n\n[View original post on LinkedIn]({})\n",
        post.url
    ));
    out
}

fn render_front_matter(out: &mut String, post: &Post, archived_at: DateTime<Utc>) {
    let mut fields: Vec<(&str, Value)> = vec![
        ("id", Value::from(post.id.as_str())),
        ("slug", Value::from(post.slug.as_deref().unwrap_or_default())),
        ("date", Value::from(post.created_at.format("%Y-%m-%d").to_string())),
        ("post_type", Value::from(post.kind.as_str())),
        ("post_url", Value::from(post.url.as_str())),
    ];
    if let Some(url) = post.original_post_url() {
        fields.push(("original_post_url", Value::from(url)));
    }
    fields.push(("archived_at", Value::from(archived_at.to_rfc3339())));
    fields.push(("tags", Value::from(post.hashtags.clone())));
    fields.push(("excerpt", Value::from(excerpt(&post.content))));

    out.push_str("---\n");
    for (key, value) in fields {
        out.push_str(&format!("{key}: {value}\n"));
    }
    out.push_str("---\n\n");
}

fn push_content(out: &mut String, content: &str) {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        out.push_str("_[No text content]_\n\n");
    } else {
        out.push_str(trimmed);
        out.push_str("\n\n");
    }
}

/// First characters of `content` on one line, with an ellipsis if cut.
#[must_use]
pub fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > EXCERPT_CHARS {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut.trim_end())
    } else {
        flat
    }
}

/// Read the front matter block of a record.
///
/// Returns `None` if the text has no front matter or no `id`.
#[must_use]
pub fn parse_front_matter(text: &str) -> Option<FrontMatter> {
    let mut lines = text.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }

    let mut map = serde_json::Map::new();
    for line in lines {
        if line.trim_end() == "---" {
            let front: FrontMatter = serde_json::from_value(Value::Object(map)).ok()?;
            return (!front.id.is_empty()).then_some(front);
        }
        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        map.insert(key.trim().to_string(), value);
    }
    None
}
