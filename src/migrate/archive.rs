//! Bulk archive and unarchive
//!
//! Selects content items by ID, repository, folder, name/content type
//! patterns or a previous run's log, then archives (or unarchives) them one
//! by one. Every success is logged so the opposite command can undo it
//! with `--revert-log`.

use std::path::PathBuf;

use futures::future::join_all;
use serde::Serialize;

use super::prompt::Prompt;
use super::{confirm, Outcome};
use crate::domain::{ContentItem, ContentStatus, PatternSet};
use crate::hub::{ContentService, HubResult};
use crate::storage::ActionLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveAction {
    Archive,
    Unarchive,
}

impl ArchiveAction {
    fn verb(&self) -> &'static str {
        match self {
            ArchiveAction::Archive => "archive",
            ArchiveAction::Unarchive => "unarchive",
        }
    }

    /// Action recorded in the log for each success
    pub fn log_action(&self) -> &'static str {
        match self {
            ArchiveAction::Archive => "ARCHIVE",
            ArchiveAction::Unarchive => "UNARCHIVE",
        }
    }

    /// Action of the opposite command, read from a revert log
    fn undone_action(&self) -> &'static str {
        match self {
            ArchiveAction::Archive => "UNARCHIVE",
            ArchiveAction::Unarchive => "ARCHIVE",
        }
    }

    /// Status of the items this action applies to
    fn source_status(&self) -> ContentStatus {
        match self {
            ArchiveAction::Archive => ContentStatus::Active,
            ArchiveAction::Unarchive => ContentStatus::Archived,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub action: ArchiveAction,
    pub id: Option<String>,
    /// Explicit selection; missing items and items already in the target
    /// status are skipped
    pub ids: Vec<String>,
    pub repo_ids: Vec<String>,
    pub folder_ids: Vec<String>,
    pub names: Vec<String>,
    pub content_types: Vec<String>,
    /// Log of an earlier run of the opposite command
    pub revert_log: Option<PathBuf>,
    pub force: bool,
    /// Keep going after a failed request
    pub ignore_error: bool,
}

impl ArchiveOptions {
    pub fn new(action: ArchiveAction) -> Self {
        Self {
            action,
            id: None,
            ids: Vec::new(),
            repo_ids: Vec::new(),
            folder_ids: Vec::new(),
            names: Vec::new(),
            content_types: Vec::new(),
            revert_log: None,
            force: false,
            ignore_error: false,
        }
    }

    fn selects_everything(&self) -> bool {
        self.id.is_none()
            && self.ids.is_empty()
            && self.names.is_empty()
            && self.content_types.is_empty()
            && self.revert_log.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub outcome: Outcome,
    pub selected: usize,
    pub succeeded: usize,
    /// IDs whose request failed
    pub failed: Vec<String>,
}

/// Archives or unarchives the selected content items
pub async fn archive_content(
    service: &dyn ContentService,
    prompt: &dyn Prompt,
    opts: &ArchiveOptions,
    log: &mut ActionLog,
) -> ArchiveReport {
    let mut report = ArchiveReport::default();
    let verb = opts.action.verb();

    if opts.id.is_some() && !opts.names.is_empty() {
        report.outcome = Outcome::Aborted("Please specify either an item name or an ID - not both.".to_string());
        return report;
    }
    if opts.id.is_some() && !opts.repo_ids.is_empty() {
        log.append_line("ID of content item is specified, ignoring repository ID");
    }
    if !opts.folder_ids.is_empty() && !opts.repo_ids.is_empty() {
        log.append_line("Folder is specified, ignoring repository ID");
    }
    if opts.selects_everything() {
        log.append_line(&format!("No filter was given, {}ing all content", verb.trim_end_matches('e')));
    }

    let (items, missing_content) = match select(service, opts).await {
        Ok(selection) => selection,
        Err(e) => {
            let reason = format!("Could not retrieve content items: {:#}", e);
            log.append_line(&reason);
            report.outcome = Outcome::Failed(reason);
            return report;
        }
    };
    report.selected = items.len();

    if items.is_empty() {
        let reason = format!("Nothing found to {}, aborting.", verb);
        log.append_line(&reason);
        report.outcome = Outcome::Aborted(reason);
        return report;
    }

    log.append_line(&format!("The following content items will be {}d:", verb));
    for item in &items {
        log.append_line(&format!(" {} ({})", item.label, item.id_str()));
    }
    log.append_line(&format!("Total: {}", items.len()));

    let question = if opts.selects_everything() {
        format!("Providing no ID or filter will {} ALL content items! Are you sure you want to do this?", verb)
    } else if missing_content {
        "Warning: Some content specified on the log is missing. Are you sure you want to continue?".to_string()
    } else {
        format!("Are you sure you want to {} these content items?", verb)
    };
    if !confirm(prompt, opts.force, &question) {
        report.outcome = Outcome::Aborted(format!("{} cancelled.", verb));
        return report;
    }

    for item in &items {
        let result = match opts.action {
            ArchiveAction::Archive => service.archive_content_item(item).await,
            ArchiveAction::Unarchive => service.unarchive_content_item(item).await,
        };

        match result {
            Ok(_) => {
                log.add_action(opts.action.log_action(), item.id_str());
                report.succeeded += 1;
            }
            Err(e) => {
                log.add_comment(&format!("{} FAILED: {}", opts.action.log_action(), item.id_str()));
                log.add_comment(&e.to_string());
                report.failed.push(item.id_str().to_string());

                if !opts.ignore_error {
                    let reason = format!(
                        "Failed to {} {} ({}), aborting. Error: {}",
                        verb,
                        item.label,
                        item.id_str(),
                        e
                    );
                    tracing::error!("{}", reason);
                    report.outcome = Outcome::Failed(reason);
                    break;
                }
                tracing::warn!(
                    "Failed to {} {} ({}), continuing. Error: {}",
                    verb,
                    item.label,
                    item.id_str(),
                    e
                );
            }
        }
    }

    log.append_line(&format!("{}d {} content items.", capitalize(verb), report.succeeded));
    report
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Candidate items, and whether a revert log named items that were not found
async fn select(service: &dyn ContentService, opts: &ArchiveOptions) -> anyhow::Result<(Vec<ContentItem>, bool)> {
    if let Some(id) = &opts.id {
        return Ok((vec![service.get_content_item(id).await?], false));
    }

    let status = opts.action.source_status();
    if !opts.ids.is_empty() {
        let mut items = Vec::new();
        let mut missing_content = false;
        for fetched in join_all(opts.ids.iter().map(|id| service.get_content_item(id))).await {
            match fetched {
                Ok(item) if item.status == status => items.push(item),
                Ok(_) => {}
                Err(e) if e.is_not_found() => missing_content = true,
                Err(e) => return Err(e.into()),
            }
        }
        return Ok((items, missing_content));
    }

    let mut items = Vec::new();
    if !opts.folder_ids.is_empty() {
        for folder_id in &opts.folder_ids {
            let listed = service.list_folder_items(folder_id).await?;
            items.extend(listed.into_iter().filter(|i| i.status == status));
        }
    } else {
        for repository_id in repositories(service, opts).await? {
            items.extend(service.list_repository_items(&repository_id, Some(status)).await?);
        }
    }

    let mut missing_content = false;
    if let Some(path) = &opts.revert_log {
        let revert_log = ActionLog::load_from_file(path)?;
        let ids = revert_log.data_for(opts.action.undone_action());
        items.retain(|i| ids.contains(&i.id_str()));
        missing_content = items.len() != ids.len();
    }

    let names = PatternSet::parse(&opts.names)?;
    if !names.is_empty() {
        items.retain(|i| names.any_match(&i.label));
    }

    let content_types = PatternSet::parse(&opts.content_types)?;
    if !content_types.is_empty() {
        items.retain(|i| i.schema().is_some_and(|s| content_types.any_match(s)));
    }

    Ok((items, missing_content))
}

async fn repositories(service: &dyn ContentService, opts: &ArchiveOptions) -> HubResult<Vec<String>> {
    if !opts.repo_ids.is_empty() {
        return Ok(opts.repo_ids.clone());
    }
    Ok(service
        .list_repositories()
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect())
}
