//! The archive-wide `INDEX.md`, rebuilt from the records on disk.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use super::render::parse_front_matter;
use crate::constants::{INDEX_FILE, POST_RECORD_FILE};
use crate::error::{ArchiveError, Result};
use crate::fs_utils::{find_files_at_depth, write_atomic};

/// One archived post as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub date: NaiveDate,
    /// Record path relative to the archive root, `/`-separated.
    pub path: String,
    pub post_type: String,
    pub excerpt: String,
}

/// Scan `base_dir` for post records and rewrite `INDEX.md`.
///
/// Records without readable front matter are left out. Returns the number of
/// posts listed.
///
/// # Errors
///
/// Returns [`ArchiveError::Filesystem`] if the archive cannot be scanned or
/// the index cannot be written.
pub async fn rebuild_index(base_dir: &Path, generated_at: DateTime<Utc>) -> Result<usize> {
    let records = find_files_at_depth(base_dir, 3, POST_RECORD_FILE).await?;

    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let text = tokio::fs::read_to_string(&record)
            .await
            .map_err(|e| ArchiveError::filesystem(&record, e))?;
        let Some(front) = parse_front_matter(&text) else {
            warn!(path = %record.display(), "Record has no front matter, leaving it out of the index");
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&front.date, "%Y-%m-%d") else {
            warn!(path = %record.display(), date = %front.date, "Record has an unreadable date");
            continue;
        };
        let path = record
            .strip_prefix(base_dir)
            .unwrap_or(&record)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(IndexEntry {
            date,
            path,
            post_type: front.post_type,
            excerpt: front.excerpt,
        });
    }

    // Newest first; path breaks ties so output is stable
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.path.cmp(&b.path)));

    let index_path = base_dir.join(INDEX_FILE);
    write_atomic(&index_path, render_index(&entries, generated_at).as_bytes()).await?;
    debug!(path = %index_path.display(), posts = entries.len(), "Rebuilt index");
    Ok(entries.len())
}

/// Render index entries, grouped by year. `entries` must already be sorted.
#[must_use]
pub fn render_index(entries: &[IndexEntry], generated_at: DateTime<Utc>) -> String {
    let mut out = String::from("# LinkedIn Posts Archive\n\n");
    out.push_str(&format!("**Total posts:** {}\n\n", entries.len()));
    out.push_str(&format!(
        "**Generated:** {}\n\n---\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let mut current_year: Option<String> = None;
    for entry in entries {
        let year = entry.date.format("%Y").to_string();
        if current_year.as_deref() != Some(year.as_str()) {
            out.push_str(&format!("\n## {year}\n\n"));
            current_year = Some(year);
        }
        let preview = if entry.excerpt.is_empty() {
            "No content".to_string()
        } else {
            entry.excerpt.replace(['[', ']'], "")
        };
        let label = if entry.post_type == "original" {
            String::new()
        } else {
            format!(" ({})", entry.post_type)
        };
        out.push_str(&format!(
            "- **{}**{label}: [{}]({})\n",
            entry.date.format("%B %d"),
            preview,
            entry.path
        ));
    }
    out
}
