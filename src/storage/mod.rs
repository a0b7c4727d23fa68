//! # Storage Layer
//!
//! Local files written and read by migration runs.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | ID mapping | JSON `{"contentItems": [[src, dst], ...]}` | `<data_dir>/imports/<target>.json` |
//! | Action log | `// comment` and `ACTION data` lines | `<data_dir>/logs/item-<action>-<DATE>.log` |
//! | Config | TOML | `<config dir>/config.toml` |
//! | Exports | One pretty JSON file per content item | user-chosen directory |
//!
//! ## Concurrency Safety
//!
//! - [`ContentMapping`] uses file locking (`fs2`) and writes atomically
//!   (temp file + rename)
//! - Action logs are written once, when a run finishes
//!
//! ## Key Types
//!
//! - [`ContentMapping`] - Source ID to destination ID table
//! - [`ActionLog`] - Run log replayed by revert and archive runs
//! - [`Config`] - Hub connection, publish policy and paths

mod action_log;
mod config;
pub mod files;
mod mapping;

pub use action_log::{resolve_log_path, ActionLog, LogEntry, LogError, DATE_TOKEN};
pub use config::{Config, ConfigError, HubConfig, PathsConfig, PublishConfig};
pub use mapping::{ContentMapping, MappingError};
