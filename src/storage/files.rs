//! Export tree helpers
//!
//! Exports are plain directory trees of pretty-printed JSON files, one file
//! per content item, mirroring the folder structure of the source hub.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;

const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

const MAX_NAME_BYTES: usize = 255;

/// Makes a label safe to use as a file or directory name
///
/// Path separators, reserved characters and control characters are removed,
/// as are trailing dots and spaces. Names that are empty or reserved on
/// some platform come back empty.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"'))
        .collect();

    while out.ends_with('.') || out.ends_with(' ') {
        out.pop();
    }

    if out == "." || out == ".." {
        return String::new();
    }

    let stem = out.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return String::new();
    }

    if out.len() > MAX_NAME_BYTES {
        let mut end = MAX_NAME_BYTES;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }

    out
}

/// Picks `dir/name.ext`, or `dir/name-N.ext` for the first N not already taken
///
/// Comparison against `taken` ignores case, so exports stay distinct on
/// case-insensitive file systems.
pub fn unique_filename_path(dir: &Path, name: &str, extension: &str, taken: &[PathBuf]) -> PathBuf {
    let taken: Vec<String> = taken
        .iter()
        .map(|p| p.to_string_lossy().to_lowercase())
        .collect();

    let mut counter = 0;
    loop {
        let file = if counter == 0 {
            format!("{}.{}", name, extension)
        } else {
            format!("{}-{}.{}", name, counter, extension)
        };

        let candidate = dir.join(file);
        if !taken.contains(&candidate.to_string_lossy().to_lowercase()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Writes a value as pretty-printed JSON, creating the parent directory
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, content).with_context(|| format!("Unable to write file: {}", path.display()))
}

/// Lists every `*.json` file under `base`, relative to `base`, sorted
pub fn list_json_files(base: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    for entry in WalkDir::new(base).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", base.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let relative = path.strip_prefix(base).with_context(|| {
            format!(
                "Failed to strip base {} from {}",
                base.display(),
                path.display()
            )
        })?;
        out.push(relative.to_path_buf());
    }

    out.sort();
    Ok(out)
}

/// Immediate subdirectories of `base`, sorted by name
pub fn list_subdirectories(base: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();

    for entry in fs::read_dir(base).with_context(|| format!("Failed to read {}", base.display()))? {
        let entry = entry.with_context(|| format!("Failed to read {}", base.display()))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            out.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize_filename("Home / Page?"), "Home  Page");
        assert_eq!(sanitize_filename("a:b*c|d\"e"), "abcde");
        assert_eq!(sanitize_filename("trailing. . "), "trailing");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("CON"), "");
        assert_eq!(sanitize_filename("console"), "console");
    }

    #[test]
    fn unique_names_ignore_case() {
        let dir = Path::new("/out");
        let mut taken = Vec::new();

        let first = unique_filename_path(dir, "Banner", "json", &taken);
        assert_eq!(first, PathBuf::from("/out/Banner.json"));
        taken.push(first);

        let second = unique_filename_path(dir, "banner", "json", &taken);
        assert_eq!(second, PathBuf::from("/out/banner-1.json"));
        taken.push(second);

        let third = unique_filename_path(dir, "BANNER", "json", &taken);
        assert_eq!(third, PathBuf::from("/out/BANNER-2.json"));
    }

    #[test]
    fn lists_json_files_recursively() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("folder/sub")).unwrap();
        fs::write(base.join("root.json"), "{}").unwrap();
        fs::write(base.join("folder/sub/deep.json"), "{}").unwrap();
        fs::write(base.join("folder/notes.txt"), "x").unwrap();

        let files = list_json_files(base).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("folder/sub/deep.json"), PathBuf::from("root.json")]
        );

        assert_eq!(list_subdirectories(base).unwrap(), vec!["folder"]);
    }

    #[test]
    fn write_json_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/item.json");

        write_json(&path, &serde_json::json!({ "label": "x" })).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"label\": \"x\""));
    }
}
