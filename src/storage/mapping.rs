//! ID mapping store
//!
//! Translates source content item IDs to their destination counterparts.
//! Persisted as `{"contentItems": [[sourceId, destId], ...]}` so the order of
//! registration survives a round trip.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Mapping file not found: {0}")]
    NotFound(String),

    #[error("Malformed mapping file {path}: {message}")]
    Malformed { path: String, message: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingFile {
    #[serde(default)]
    content_items: Vec<(String, String)>,
}

/// Source ID to destination ID translation table
#[derive(Debug, Clone, Default)]
pub struct ContentMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl ContentMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the destination ID registered for a source ID
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.index
            .get(source_id)
            .map(|i| self.entries[*i].1.as_str())
    }

    /// Registers (or replaces) the translation for a source ID
    pub fn register(&mut self, source_id: impl Into<String>, dest_id: impl Into<String>) {
        let source_id = source_id.into();
        let dest_id = dest_id.into();

        match self.index.get(&source_id) {
            Some(i) => self.entries[*i].1 = dest_id,
            None => {
                self.index.insert(source_id.clone(), self.entries.len());
                self.entries.push((source_id, dest_id));
            }
        }
    }

    /// Source IDs in registration order
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(source, _)| source.as_str())
    }

    /// All pairs in registration order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a mapping file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MappingError::NotFound(path.display().to_string()).into());
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open mapping file: {}", path.display()))?;

        file.lock_shared()
            .context("Failed to acquire read lock on mapping file")?;

        let parsed: MappingFile =
            serde_json::from_reader(BufReader::new(&file)).map_err(|e| MappingError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut mapping = Self::new();
        for (source, dest) in parsed.content_items {
            mapping.register(source, dest);
        }
        Ok(mapping)
    }

    /// Writes the mapping file (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = path.with_extension("json.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on mapping file")?;

            let mut writer = BufWriter::new(&file);
            let contents = MappingFile {
                content_items: self.entries.clone(),
            };
            serde_json::to_writer(&mut writer, &contents)
                .context("Failed to serialize mapping")?;
            writer.flush().context("Failed to flush mapping file")?;
        }

        fs::rename(&temp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn register_and_get() {
        let mut mapping = ContentMapping::new();
        assert!(mapping.get("a").is_none());

        mapping.register("a", "1");
        mapping.register("b", "2");
        mapping.register("a", "3");

        assert_eq!(mapping.get("a"), Some("3"));
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.source_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn save_and_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imports").join("repo-1.json");

        let mut mapping = ContentMapping::new();
        mapping.register("z", "1");
        mapping.register("a", "2");
        mapping.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["contentItems"][0][0], "z");

        let loaded = ContentMapping::load(&path).unwrap();
        assert_eq!(loaded.entries(), mapping.entries());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");

        let err = ContentMapping::load(&path).unwrap_err();
        assert!(err.downcast_ref::<MappingError>().is_some());
    }

    #[test]
    fn corrupt_file_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ContentMapping::load(&path)
                .unwrap_err()
                .downcast_ref::<MappingError>(),
            Some(MappingError::Malformed { .. })
        ));
    }
}
