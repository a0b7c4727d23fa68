//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `import <dir>` | Import an export tree, in dependency order |
//! | `export <dir>` | Export repositories/folders with their dependencies |
//! | `archive [id]` / `unarchive [id]` | Bulk archive or unarchive |
//! | `copy` / `move` | Export and re-import between hubs; `move` archives the source |
//! | `mapping show` / `mapping get` | Inspect mapping files (offline) |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable summary
//! - `json` - The run report as JSON
//!
//! Progress lines go to stderr through `tracing`; `RUST_LOG` overrides the
//! default level and `--verbose` raises it to debug.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod archive_cmd;
mod copy_cmd;
mod export_cmd;
mod import_cmd;
mod mapping_cmd;
mod output;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
