//! Turning fetched posts into the on-disk archive.
//!
//! Layout under the base directory:
//!
//! ```text
//! INDEX.md
//! <year>/<month>/<slug>/post.md
//! <year>/<month>/<slug>/media/<kind>-<n>.<ext>
//! ```
//!
//! `post.md` is written last and atomically, so its presence means the post
//! is fully archived.

pub mod index;
pub mod orchestrator;
pub mod render;
pub mod stats;

pub use index::{rebuild_index, render_index, IndexEntry};
pub use orchestrator::{ArchiveOrchestrator, RunOptions};
pub use render::{excerpt, parse_front_matter, render_post, FrontMatter};
pub use stats::{RunReport, RunState};
