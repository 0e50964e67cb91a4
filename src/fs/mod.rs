//! Filesystem helpers
//!
//! Name sanitization for block directories and image files, plus atomic JSON/JSONL
//! writes used by the export step.

mod names;
mod write;

pub use names::{sanitize_filename, slugify, DEFAULT_SLUG_LENGTH};
pub use write::{atomic_write_json, atomic_write_jsonl, ensure_directory};
