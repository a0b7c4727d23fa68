//! Action log files
//!
//! Every mutating run writes a line-oriented log:
//!
//! ```text
//! // <title>
//! // <comment>
//! CREATE <id>
//! UPDATE <id> <oldVersion> <newVersion>
//! ```
//!
//! Logs are read back by revert and archive/unarchive runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;

/// Token in a log path replaced by the run's timestamp
pub const DATE_TOKEN: &str = "<DATE>";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("Log has no title line: {0}")]
    MissingTitle(String),
}

/// One line of an action log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Comment(String),
    Action { action: String, data: String },
}

/// An action log, optionally bound to a file it is written to on close
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    title: String,
    entries: Vec<LogEntry>,
    path: Option<PathBuf>,
}

impl ActionLog {
    /// Creates an in-memory log with a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Creates a log that is written to `path` on [`ActionLog::close`]
    ///
    /// A `<DATE>` token in the path is replaced by the current timestamp.
    pub fn to_file(title: impl Into<String>, path: &Path) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
            path: Some(resolve_log_path(path)),
        }
    }

    /// Reads a log file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LogError::NotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read log: {}", path.display()))?;

        let mut title = None;
        let mut log = Self::default();

        for line in content.lines() {
            if let Some(message) = line.strip_prefix("//") {
                let message = message.trim_start();
                if title.is_none() {
                    title = Some(message.to_string());
                } else {
                    log.add_comment(message);
                }
                continue;
            }

            if let Some((action, data)) = line.split_once(' ') {
                log.add_action(action, data);
            }
        }

        log.title = title.ok_or_else(|| LogError::MissingTitle(path.display().to_string()))?;
        Ok(log)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Path the log will be written to, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Adds a comment; multi-line comments become one entry per line
    pub fn add_comment(&mut self, comment: &str) {
        for line in comment.split('\n') {
            self.entries.push(LogEntry::Comment(line.to_string()));
        }
    }

    pub fn add_action(&mut self, action: &str, data: impl Into<String>) {
        self.entries.push(LogEntry::Action {
            action: action.to_string(),
            data: data.into(),
        });
    }

    /// Emits a progress line and records it as a comment
    pub fn append_line(&mut self, text: &str) {
        tracing::info!("{}", text);
        self.add_comment(text);
    }

    /// Data of every entry with the given action, in order
    pub fn data_for(&self, action: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Action { action: a, data } if a == action => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Renders the log in its file format
    pub fn render(&self) -> String {
        let mut out = format!("// {}\n", self.title);
        for entry in &self.entries {
            match entry {
                LogEntry::Comment(text) => out.push_str(&format!("// {}\n", text)),
                LogEntry::Action { action, data } => {
                    out.push_str(&format!("{} {}\n", action, data))
                }
            }
        }
        out
    }

    /// Writes the log to `path`, creating its directory
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(path, self.render())
            .with_context(|| format!("Failed to write log: {}", path.display()))
    }

    /// Writes the log to its bound file, if any
    ///
    /// Failure is reported and swallowed; a run never fails because its log
    /// could not be written.
    pub fn close(&self) {
        let Some(path) = &self.path else {
            return;
        };

        match self.write_to_file(path) {
            Ok(()) => tracing::info!("Log written to \"{}\".", path.display()),
            Err(e) => tracing::warn!("Could not write log: {:#}", e),
        }
    }
}

/// Replaces the `<DATE>` token in a log path with a millisecond timestamp
pub fn resolve_log_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if !raw.contains(DATE_TOKEN) {
        return path.to_path_buf();
    }

    let stamp = Utc::now().timestamp_millis().to_string();
    PathBuf::from(raw.replace(DATE_TOKEN, &stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn render_format() {
        let mut log = ActionLog::new("Content import");
        log.add_comment("first\nsecond");
        log.add_action("CREATE", "abc");
        log.add_action("UPDATE", "def 1 2");

        assert_eq!(
            log.render(),
            "// Content import\n// first\n// second\nCREATE abc\nUPDATE def 1 2\n"
        );
    }

    #[test]
    fn load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.log");

        let mut log = ActionLog::new("Archive");
        log.add_comment("note");
        log.add_action("ARCHIVE", "a");
        log.add_action("ARCHIVE", "b");
        log.add_action("UNARCHIVE", "c");
        log.write_to_file(&path).unwrap();

        let loaded = ActionLog::load_from_file(&path).unwrap();
        assert_eq!(loaded.title(), "Archive");
        assert_eq!(loaded.data_for("ARCHIVE"), vec!["a", "b"]);
        assert_eq!(loaded.data_for("UNARCHIVE"), vec!["c"]);
        assert_eq!(loaded.entries()[0], LogEntry::Comment("note".to_string()));
    }

    #[test]
    fn load_ignores_lines_without_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "// Title\nGARBAGE\n\nUPDATE x 1 3\n").unwrap();

        let loaded = ActionLog::load_from_file(&path).unwrap();
        assert_eq!(loaded.entries().len(), 1);
        assert_eq!(loaded.data_for("UPDATE"), vec!["x 1 3"]);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ActionLog::load_from_file(&dir.path().join("nope.log")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogError>(),
            Some(LogError::NotFound(_))
        ));
    }

    #[test]
    fn date_token_is_replaced() {
        let resolved = resolve_log_path(Path::new("/logs/item-import-<DATE>.log"));
        let name = resolved.file_name().unwrap().to_string_lossy().to_string();

        assert!(!name.contains(DATE_TOKEN));
        assert!(name.starts_with("item-import-"));
        assert_eq!(
            resolve_log_path(Path::new("/logs/plain.log")),
            PathBuf::from("/logs/plain.log")
        );
    }

    #[test]
    fn close_writes_bound_file() {
        let dir = TempDir::new().unwrap();
        let mut log = ActionLog::to_file("Run", &dir.path().join("out-<DATE>.log"));
        log.append_line("hello");

        let path = log.path().unwrap().to_path_buf();
        log.close();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "// Run\n// hello\n");
    }
}
