//! Import revert
//!
//! Undoes an import from its action log: created items are archived, updated
//! items are restored to the version they had before the import. Failures on
//! individual items are logged and the revert moves on.

use std::path::Path;

use serde::Serialize;

use super::prompt::Prompt;
use super::{confirm, Outcome};
use crate::domain::ContentItem;
use crate::hub::ContentService;
use crate::storage::ActionLog;

/// Summary of a revert run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevertReport {
    pub outcome: Outcome,
    pub archived: usize,
    pub reverted: usize,
    /// Updates that did not change the item
    pub unchanged: usize,
    /// Logged items that no longer exist
    pub missing: usize,
    pub failed: usize,
}

struct RevertEntry {
    item: ContentItem,
    /// 0 when the import created the item
    old_version: u64,
    new_version: u64,
}

/// Parses an `UPDATE` entry: `<id> <old version> <new version>`
fn parse_update(data: &str) -> Option<(&str, u64, u64)> {
    let mut parts = data.split(' ');
    let (Some(id), Some(old), Some(new), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    Some((id, old.parse().ok()?, new.parse().ok()?))
}

/// Reverts the import recorded at `log_path`
pub async fn revert_import(
    service: &dyn ContentService,
    prompt: &dyn Prompt,
    log_path: &Path,
    force: bool,
    log: &mut ActionLog,
) -> RevertReport {
    let mut report = RevertReport::default();

    let import_log = match ActionLog::load_from_file(log_path) {
        Ok(import_log) => import_log,
        Err(e) => {
            let reason = format!("Could not open the import log! Aborting. {:#}", e);
            log.append_line(&reason);
            report.outcome = Outcome::Failed(reason);
            return report;
        }
    };

    let mut entries = Vec::new();
    for id in import_log.data_for("CREATE") {
        match service.get_content_item(id).await {
            Ok(item) => entries.push(RevertEntry {
                item,
                old_version: 0,
                new_version: 1,
            }),
            Err(_) => {
                log.append_line(&format!("Could not find item with id {}, skipping.", id));
                report.missing += 1;
            }
        }
    }

    for data in import_log.data_for("UPDATE") {
        let Some((id, old_version, new_version)) = parse_update(data) else {
            continue;
        };
        if old_version == new_version {
            report.unchanged += 1;
            continue;
        }

        match service.get_content_item(id).await {
            Ok(item) => entries.push(RevertEntry {
                item,
                old_version,
                new_version,
            }),
            Err(_) => {
                log.append_line(&format!("Could not find item with id {}, skipping.", id));
                report.missing += 1;
            }
        }
    }

    if report.unchanged > 0 {
        log.append_line(&format!(
            "{} content items were imported, but were not updated so there is nothing to revert. Ignoring.",
            report.unchanged
        ));
    }

    let changed: Vec<&RevertEntry> = entries
        .iter()
        .filter(|e| e.item.version_or_zero() != e.new_version)
        .collect();
    if !changed.is_empty() {
        log.append_line(&format!(
            "{} content items have been changed since they were imported:",
            changed.len()
        ));
        for entry in &changed {
            let archived = if entry.item.status.is_active() {
                ""
            } else {
                ", has been archived"
            };
            log.append_line(&format!(
                "  {} (modified {} times since import{})",
                entry.item.label,
                entry.item.version_or_zero().saturating_sub(entry.new_version),
                archived
            ));
        }

        if !confirm(
            prompt,
            force,
            "Do you want to continue with the revert, losing any changes made since the import?",
        ) {
            let reason = "Revert cancelled.".to_string();
            log.append_line(&reason);
            report.outcome = Outcome::Aborted(reason);
            return report;
        }
    }

    if entries.is_empty() {
        log.append_line("No actions found to revert.");
    }

    for entry in entries {
        let item = &entry.item;
        let id = item.id_str();

        if entry.old_version == 0 {
            if !item.status.is_active() {
                continue;
            }
            log.append_line(&format!("Archiving {}.", item.label));
            match service.archive_content_item(item).await {
                Ok(_) => {
                    log.add_action("ARCHIVE", id);
                    report.archived += 1;
                }
                Err(e) => {
                    log.append_line(&format!("Could not archive {}! {} Continuing...", item.label, e));
                    report.failed += 1;
                }
            }
            continue;
        }

        let mut restored = match service.content_item_version(id, entry.old_version).await {
            Ok(old) => old,
            Err(e) => {
                log.append_line(&format!(
                    "Could not get old version for {}! {} Continuing...",
                    item.label, e
                ));
                report.failed += 1;
                continue;
            }
        };

        log.append_line(&format!(
            "Reverting {} to version {}.",
            item.label, entry.old_version
        ));
        restored.id = item.id.clone();
        restored.version = item.version;
        match service.update_content_item(&restored).await {
            Ok(updated) => {
                log.add_action(
                    "UPDATE",
                    format!(
                        "{} {} {}",
                        id,
                        item.version_or_zero(),
                        updated.version_or_zero()
                    ),
                );
                report.reverted += 1;
            }
            Err(e) => {
                log.append_line(&format!("Could not revert {}! {} Continuing...", item.label, e));
                report.failed += 1;
            }
        }
    }

    log.append_line("Done!");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryHub;
    use crate::migrate::AutoPrompt;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, entries: &[(&str, String)]) -> std::path::PathBuf {
        let mut import_log = ActionLog::new("hub-migrate import");
        for (action, data) in entries {
            import_log.add_action(action, data.clone());
        }
        let path = dir.path().join("import.log");
        import_log.write_to_file(&path).unwrap();
        path
    }

    #[test]
    fn parses_update_entries() {
        assert_eq!(parse_update("abc 1 4"), Some(("abc", 1, 4)));
        assert_eq!(parse_update("abc 1"), None);
        assert_eq!(parse_update("abc 1 4 9"), None);
        assert_eq!(parse_update("abc x 4"), None);
    }

    #[tokio::test]
    async fn archives_created_and_restores_updated() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");

        let created = hub.insert_item(&repo.id, ContentItem::new("new", json!({})));
        let original = hub.insert_item(&repo.id, ContentItem::new("old", json!({ "v": 1 })));
        let mut changed = original.clone();
        changed.body = json!({ "v": 2 });
        let changed = hub.update_content_item(&changed).await.unwrap();

        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            &[
                ("CREATE", created.id_str().to_string()),
                ("UPDATE", format!("{} 1 2", changed.id_str())),
                ("UPDATE", "unchanged 3 3".to_string()),
                ("CREATE", "missing".to_string()),
            ],
        );

        let prompt = AutoPrompt::new(false);
        let mut log = ActionLog::new("revert");
        let report = revert_import(&hub, &prompt, &path, false, &mut log).await;

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.archived, 1);
        assert_eq!(report.reverted, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.missing, 1);
        assert!(prompt.asked().is_empty());

        assert!(!hub.item(created.id_str()).unwrap().status.is_active());
        assert_eq!(hub.item(changed.id_str()).unwrap().body, json!({ "v": 1 }));
        assert_eq!(log.data_for("ARCHIVE"), vec![created.id_str()]);
    }

    #[tokio::test]
    async fn items_changed_since_import_need_confirmation() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let created = hub.insert_item(&repo.id, ContentItem::new("new", json!({})));
        let mut edited = created.clone();
        edited.body = json!({ "edited": true });
        hub.update_content_item(&edited).await.unwrap();

        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, &[("CREATE", created.id_str().to_string())]);

        let prompt = AutoPrompt::new(false);
        let mut log = ActionLog::new("revert");
        let report = revert_import(&hub, &prompt, &path, false, &mut log).await;

        assert!(matches!(report.outcome, Outcome::Aborted(_)));
        assert_eq!(prompt.asked().len(), 1);
        assert!(hub.item(created.id_str()).unwrap().status.is_active());
    }

    #[tokio::test]
    async fn unreadable_log_fails() {
        let hub = MemoryHub::new();
        let mut log = ActionLog::new("revert");
        let report = revert_import(
            &hub,
            &AutoPrompt::new(true),
            Path::new("/nonexistent/import.log"),
            true,
            &mut log,
        )
        .await;

        assert!(matches!(report.outcome, Outcome::Failed(_)));
    }
}
