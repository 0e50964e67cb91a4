//! Configuration module for Forum-Loader
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is built once and passed by reference to the store, the
//! download engine and the orchestrator.
//!
//! # Example
//!
//! ```no_run
//! use forum_loader::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("loader.toml")).unwrap();
//! println!("Images go to {}", config.layout().img_dir.display());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DownloadConfig, ForumConfig, OutputConfig, OutputLayout, PageKind,
    DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
