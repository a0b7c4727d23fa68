//! Content export
//!
//! Writes repositories and folders to a directory tree, one JSON file per
//! item, then pulls in every item the exported content points at so the
//! tree can be imported on its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use futures::future::join_all;
use serde::Serialize;

use super::Outcome;
use crate::domain::{BatchItem, ContentItem, ContentStatus, DependencyGraph, PatternSet};
use crate::hub::{ContentService, Folder, HubResult, RequiredPropertyValidator, SchemaValidator};
use crate::storage::files::{sanitize_filename, unique_filename_path, write_json};
use crate::storage::{ActionLog, ContentMapping};

/// Folders fetched concurrently per wave
const PARALLELISM: usize = 10;

/// Directory referenced items are written to
const DEPENDENCIES_DIR: &str = "_dependencies";

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub dir: PathBuf,
    pub repo_ids: Vec<String>,
    pub folder_ids: Vec<String>,
    /// Exact or `/regex/` schema IDs
    pub schema_ids: Vec<String>,
    /// Exact or `/regex/` labels
    pub names: Vec<String>,
    /// Export the last published version where there is one
    pub publish: bool,
}

impl ExportOptions {
    fn hub_wide(&self) -> bool {
        self.repo_ids.is_empty() && self.folder_ids.is_empty()
    }
}

/// Summary of an export run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub outcome: Outcome,
    /// Files written, dependencies included
    pub files: Vec<PathBuf>,
    /// Referenced items added to the export
    pub dependencies: usize,
    /// Referenced IDs that do not exist on the hub
    pub missing: Vec<String>,
    /// Items that did not validate
    pub warnings: usize,
    /// Source IDs of every item written
    pub exported_ids: Vec<String>,
}

/// An item and the directory it goes to, relative to the export root
struct Entry {
    item: ContentItem,
    path: PathBuf,
}

/// Exports content to `opts.dir`
pub async fn export_content(
    service: &dyn ContentService,
    opts: &ExportOptions,
    log: &mut ActionLog,
) -> ExportReport {
    let mut report = ExportReport::default();

    let (schemas, names) = match (PatternSet::parse(&opts.schema_ids), PatternSet::parse(&opts.names)) {
        (Ok(schemas), Ok(names)) => (schemas, names),
        (Err(e), _) | (_, Err(e)) => {
            report.outcome = Outcome::Failed(e.to_string());
            return report;
        }
    };

    log.append_line("Retrieving content items, please wait.");
    let (mut entries, repository_labels) = match collect(service, opts, log).await {
        Ok(collected) => collected,
        Err(e) => {
            let reason = format!("Could not retrieve content: {}", e);
            log.append_line(&reason);
            report.outcome = Outcome::Failed(reason);
            return report;
        }
    };

    if !schemas.is_empty() {
        entries.retain(|e| e.item.schema().is_some_and(|s| schemas.any_match(s)));
    }
    if !names.is_empty() {
        entries.retain(|e| names.any_match(&e.item.label));
    }

    log.append_line("Scanning for dependencies.");
    let dependencies = complete_dependencies(service, &entries, log).await;
    for (id, fetched) in dependencies {
        let Some(item) = fetched else {
            log.append_line(&format!("Referenced content {} does not exist.", id));
            report.missing.push(id);
            continue;
        };

        if item.status.is_active() {
            log.append_line(&format!("Referenced content '{}' added to the export.", item.label));
        } else {
            log.append_line(&format!(
                "Referenced content '{}' is archived, but is needed as a dependency. It has been added to the export.",
                item.label
            ));
        }

        let mut path = PathBuf::new();
        if opts.hub_wide() {
            if let Some(label) = item
                .content_repository_id
                .as_ref()
                .and_then(|id| repository_labels.get(id))
            {
                path.push(sanitize_filename(label));
            }
        }
        path.push(DEPENDENCIES_DIR);

        report.dependencies += 1;
        entries.push(Entry { item, path });
    }

    log.append_line("Saving content items.");
    let validator = match RequiredPropertyValidator::load(service).await {
        Ok(validator) => Some(validator),
        Err(e) => {
            log.append_line(&format!("WARNING: Could not load schemas, content will not be validated: {}", e));
            None
        }
    };

    for entry in entries {
        if let Some(validator) = &validator {
            report.warnings += usize::from(warn_if_invalid(validator, &entry.item, log).await);
        }

        let directory = opts.dir.join(&entry.path);
        let path = unique_filename_path(&directory, &sanitize_filename(&entry.item.label), "json", &report.files);
        log.append_line(&path.display().to_string());

        if let Err(e) = write_json(&path, &entry.item) {
            let reason = format!("{:#}", e);
            log.append_line(&reason);
            report.outcome = Outcome::Failed(reason);
            return report;
        }
        report.files.push(path);
        if let Some(id) = &entry.item.id {
            report.exported_ids.push(id.clone());
        }
    }

    report
}

/// Returns true if the item did not validate
async fn warn_if_invalid(validator: &dyn SchemaValidator, item: &ContentItem, log: &mut ActionLog) -> bool {
    match validator.validate(&item.body).await {
        Ok(errors) if errors.is_empty() => false,
        Ok(errors) => {
            log.append_line(&format!(
                "WARNING: {} does not validate under the available schema. It may not import correctly.",
                item.label
            ));
            for error in errors {
                log.append_line(&format!("  {}", error));
            }
            true
        }
        Err(e) => {
            log.append_line(&format!(
                "WARNING: Could not validate {} as there is a problem with the schema: {}",
                item.label, e
            ));
            true
        }
    }
}

/// Gathers every active item under the requested bases
///
/// Also returns the label of every repository seen, by ID.
async fn collect(
    service: &dyn ContentService,
    opts: &ExportOptions,
    log: &mut ActionLog,
) -> HubResult<(Vec<Entry>, HashMap<String, String>)> {
    let repositories = if opts.hub_wide() {
        service.list_repositories().await?
    } else {
        join_all(opts.repo_ids.iter().map(|id| service.get_repository(id)))
            .await
            .into_iter()
            .collect::<HubResult<Vec<_>>>()?
    };

    let base_folders = join_all(opts.folder_ids.iter().map(|id| service.get_folder(id)))
        .await
        .into_iter()
        .collect::<HubResult<Vec<_>>>()?;
    log.append_line(&format!("Found {} base folders.", base_folders.len()));

    let separate_bases = repositories.len() + base_folders.len() > 1;

    let mut entries = Vec::new();
    let mut queue: VecDeque<(Folder, PathBuf)> = VecDeque::new();
    let mut repository_items: HashMap<String, Vec<ContentItem>> = HashMap::new();
    let mut listed_repositories = HashSet::new();

    for repository in &repositories {
        let base = if separate_bases {
            PathBuf::from(sanitize_filename(&repository.label))
        } else {
            PathBuf::new()
        };

        let items = match service
            .list_repository_items(&repository.id, Some(ContentStatus::Active))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                log.append_line(&format!(
                    "Error getting items from repository {} ({}): {}",
                    repository.name, repository.id, e
                ));
                continue;
            }
        };
        listed_repositories.insert(repository.id.clone());

        for item in items {
            match item.folder_id.clone() {
                Some(folder_id) => repository_items.entry(folder_id).or_default().push(item),
                None => entries.push(Entry {
                    item,
                    path: base.clone(),
                }),
            }
        }

        for folder in service.list_folders(&repository.id).await? {
            let path = base.join(sanitize_filename(&folder.name));
            queue.push_back((folder, path));
        }
    }

    for folder in base_folders {
        let path = if separate_bases {
            PathBuf::from(sanitize_filename(&folder.name))
        } else {
            PathBuf::new()
        };
        queue.push_back((folder, path));
    }

    let mut visited = HashSet::new();
    while !queue.is_empty() {
        let take = queue.len().min(PARALLELISM);
        let wave: Vec<(Folder, PathBuf)> = queue
            .drain(..take)
            .filter(|(folder, _)| visited.insert(folder.id.clone()))
            .collect();

        let scans = join_all(wave.iter().map(|(folder, _)| {
            let listed = folder
                .repository_id
                .as_ref()
                .is_some_and(|id| listed_repositories.contains(id));
            scan_folder(service, folder, listed, &repository_items)
        }))
        .await;

        for ((folder, path), scan) in wave.into_iter().zip(scans) {
            log.append_line(&format!("Processing {}...", path.display()));
            let (items, subfolders) = match scan {
                Ok(scan) => scan,
                Err(e) => {
                    log.append_line(&format!(
                        "Error getting content from folder {} ({}): {}",
                        folder.name, folder.id, e
                    ));
                    continue;
                }
            };

            entries.extend(items.into_iter().map(|item| Entry {
                item,
                path: path.clone(),
            }));
            for subfolder in subfolders {
                let sub_path = path.join(sanitize_filename(&subfolder.name));
                queue.push_back((subfolder, sub_path));
            }
        }
    }

    if opts.publish {
        for entry in &mut entries {
            let Some(published) = entry.item.last_published_version else {
                continue;
            };
            if Some(published) == entry.item.version {
                continue;
            }

            match service.content_item_version(entry.item.id_str(), published).await {
                Ok(version) => entry.item = version,
                Err(e) => log.append_line(&format!(
                    "Could not get the published version of {}, exporting the newest: {}",
                    entry.item.label, e
                )),
            }
        }
    }

    let labels = repositories.into_iter().map(|r| (r.id, r.label)).collect();
    Ok((entries, labels))
}

/// Active items and subfolders of one folder
async fn scan_folder(
    service: &dyn ContentService,
    folder: &Folder,
    repository_listed: bool,
    repository_items: &HashMap<String, Vec<ContentItem>>,
) -> HubResult<(Vec<ContentItem>, Vec<Folder>)> {
    let items = if repository_listed {
        repository_items.get(&folder.id).cloned().unwrap_or_default()
    } else {
        service
            .list_folder_items(&folder.id)
            .await?
            .into_iter()
            .filter(|item| item.status.is_active())
            .collect()
    };

    let subfolders = service.list_subfolders(&folder.id).await?;
    Ok((items, subfolders))
}

/// Fetches items referenced by the export but not part of it
///
/// Repeats until no new IDs turn up, so dependencies of dependencies are
/// included too. Returns every referenced ID in discovery order, with the
/// item when it exists.
async fn complete_dependencies(
    service: &dyn ContentService,
    entries: &[Entry],
    log: &mut ActionLog,
) -> Vec<(String, Option<ContentItem>)> {
    let empty = ContentMapping::new();
    let mut pool: Vec<ContentItem> = entries.iter().map(|e| e.item.clone()).collect();
    let mut found: Vec<(String, Option<ContentItem>)> = Vec::new();
    let mut seen = HashSet::new();

    loop {
        let graph = DependencyGraph::new(pool.iter().cloned().map(|item| BatchItem::new(item, None)), &empty);

        let mut new_ids = Vec::new();
        for (idx, _) in graph.records() {
            for marker in graph.missing_dependencies(idx, &empty) {
                if seen.insert(marker.id.clone()) {
                    new_ids.push(marker.id.clone());
                }
            }
        }

        if new_ids.is_empty() {
            break;
        }
        log.add_comment(&format!("Fetching {} referenced items.", new_ids.len()));

        let fetched = join_all(new_ids.iter().map(|id| service.get_content_item(id))).await;
        for (id, result) in new_ids.into_iter().zip(fetched) {
            let item = result.ok();
            if let Some(item) = &item {
                pool.push(item.clone());
            }
            found.push((id, item));
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::marker::CONTENT_LINK_SCHEMA;
    use crate::hub::MemoryHub;
    use serde_json::json;
    use tempfile::TempDir;

    fn body(links: &[&str]) -> serde_json::Value {
        let links: Vec<_> = links
            .iter()
            .map(|id| json!({ "_meta": { "schema": CONTENT_LINK_SCHEMA }, "contentType": "c", "id": id }))
            .collect();
        json!({ "_meta": { "schema": "https://example.com/page" }, "links": links })
    }

    fn in_folder(folder: &Folder, label: &str, links: &[&str]) -> ContentItem {
        let mut item = ContentItem::new(label, body(links));
        item.folder_id = Some(folder.id.clone());
        item
    }

    #[tokio::test]
    async fn mirrors_folders_and_skips_archived() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let blog = hub.add_folder(&repo.id, None, "blog");
        let year = hub.add_folder(&repo.id, Some(&blog.id), "2024");

        hub.insert_item(&repo.id, ContentItem::new("Home", body(&[])));
        hub.insert_item(&repo.id, in_folder(&blog, "Intro", &[]));
        hub.insert_item(&repo.id, in_folder(&year, "Post", &[]));
        hub.insert_item(&repo.id, in_folder(&year, "Post", &[]));
        let old = hub.insert_item(&repo.id, in_folder(&year, "Old", &[]));
        hub.archive_content_item(&old).await.unwrap();

        let dir = TempDir::new().unwrap();
        let opts = ExportOptions {
            dir: dir.path().to_path_buf(),
            repo_ids: vec![repo.id.clone()],
            ..ExportOptions::default()
        };
        let mut log = ActionLog::new("export");
        let report = export_content(&hub, &opts, &mut log).await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.files.len(), 4);
        assert!(dir.path().join("Home.json").exists());
        assert!(dir.path().join("blog/Intro.json").exists());
        assert!(dir.path().join("blog/2024/Post.json").exists());
        assert!(dir.path().join("blog/2024/Post-1.json").exists());
        assert!(!dir.path().join("blog/2024/Old.json").exists());
    }

    #[tokio::test]
    async fn pulls_in_transitive_dependencies() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let other = hub.add_repository("shared", "Shared");
        let folder = hub.add_folder(&repo.id, None, "pages");

        let leaf = hub.insert_item(&other.id, ContentItem::new("Leaf", body(&[])));
        let middle = hub.insert_item(&other.id, ContentItem::new("Middle", body(&[leaf.id_str()])));
        hub.archive_content_item(&middle).await.unwrap();
        hub.insert_item(&repo.id, in_folder(&folder, "Page", &[middle.id_str(), "gone"]));

        let dir = TempDir::new().unwrap();
        let opts = ExportOptions {
            dir: dir.path().to_path_buf(),
            folder_ids: vec![folder.id.clone()],
            ..ExportOptions::default()
        };
        let mut log = ActionLog::new("export");
        let report = export_content(&hub, &opts, &mut log).await;

        assert_eq!(report.dependencies, 2);
        assert_eq!(report.missing, vec!["gone".to_string()]);
        assert_eq!(report.exported_ids.len(), 3);
        assert!(dir.path().join("Page.json").exists());
        assert!(dir.path().join("_dependencies/Middle.json").exists());
        assert!(dir.path().join("_dependencies/Leaf.json").exists());
    }

    #[tokio::test]
    async fn hub_wide_export_uses_repository_directories() {
        let hub = MemoryHub::new();
        let a = hub.add_repository("a", "Alpha");
        let b = hub.add_repository("b", "Beta");
        hub.insert_item(&a.id, ContentItem::new("One", body(&[])));
        hub.insert_item(&b.id, ContentItem::new("Two", body(&[])));

        let dir = TempDir::new().unwrap();
        let opts = ExportOptions {
            dir: dir.path().to_path_buf(),
            names: vec!["/^T/".to_string()],
            ..ExportOptions::default()
        };
        let mut log = ActionLog::new("export");
        let report = export_content(&hub, &opts, &mut log).await;

        assert_eq!(report.files, vec![dir.path().join("Beta/Two.json")]);
    }

    #[tokio::test]
    async fn publish_exports_last_published_version() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let mut item = ContentItem::new("Page", json!({ "_meta": { "schema": "s" }, "v": 1 }));
        item.last_published_version = Some(1);
        let item = hub.insert_item(&repo.id, item);
        let mut edited = item.clone();
        edited.body = json!({ "_meta": { "schema": "s" }, "v": 2 });
        hub.update_content_item(&edited).await.unwrap();

        let dir = TempDir::new().unwrap();
        let opts = ExportOptions {
            dir: dir.path().to_path_buf(),
            repo_ids: vec![repo.id.clone()],
            publish: true,
            ..ExportOptions::default()
        };
        let mut log = ActionLog::new("export");
        export_content(&hub, &opts, &mut log).await;

        let written: ContentItem =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("Page.json")).unwrap()).unwrap();
        assert_eq!(written.body["v"], 1);
    }

    #[tokio::test]
    async fn invalid_filter_fails() {
        let hub = MemoryHub::new();
        let opts = ExportOptions {
            names: vec!["/(/".to_string()],
            ..ExportOptions::default()
        };
        let mut log = ActionLog::new("export");
        let report = export_content(&hub, &opts, &mut log).await;

        assert!(matches!(report.outcome, Outcome::Failed(_)));
    }
}
