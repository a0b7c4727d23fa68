//! `archive` and `unarchive` commands

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::app::connect;
use super::output::Output;
use crate::migrate::{archive_content, ArchiveAction, ArchiveOptions, StdinPrompt};
use crate::storage::{ActionLog, Config};

#[derive(Args)]
pub struct ArchiveArgs {
    /// A single content item; without it every matching item in the hub is selected
    pub id: Option<String>,

    /// Only select items in this repository (repeatable)
    #[arg(long = "repo-id")]
    pub repo_ids: Vec<String>,

    /// Only select items in this folder (repeatable)
    #[arg(long = "folder-id")]
    pub folder_ids: Vec<String>,

    /// Only select items with this name; `/regex/` allowed (repeatable)
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Only select items with this schema ID; `/regex/` allowed (repeatable)
    #[arg(long = "content-type")]
    pub content_types: Vec<String>,

    /// Undo the items recorded in a log of the opposite command
    #[arg(long)]
    pub revert_log: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(long)]
    pub force: bool,

    /// Do not write a log file
    #[arg(long, short = 's')]
    pub silent: bool,

    /// Keep going when a request fails
    #[arg(long)]
    pub ignore_error: bool,

    /// Log file to write (`<DATE>` is replaced by a timestamp)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: ArchiveArgs, action: ArchiveAction, config: &Config, output: &Output) -> Result<bool> {
    let hub = connect(config)?;

    let title = format!("Content Items {} Log", action.log_action());
    let mut log = if args.silent {
        ActionLog::new(title)
    } else {
        let name = action.log_action().to_ascii_lowercase();
        let path = args
            .log_file
            .clone()
            .unwrap_or_else(|| config.default_log_path("item", &name));
        ActionLog::to_file(title, &path)
    };

    let opts = ArchiveOptions {
        id: args.id,
        repo_ids: args.repo_ids,
        folder_ids: args.folder_ids,
        names: args.names,
        content_types: args.content_types,
        revert_log: args.revert_log,
        force: args.force,
        ignore_error: args.ignore_error,
        ..ArchiveOptions::new(action)
    };

    let report = archive_content(hub.as_ref(), &StdinPrompt, &opts, &mut log).await;
    log.close();

    let summary = format!(
        "{} {} of {} content items.",
        match action {
            ArchiveAction::Archive => "Archived",
            ArchiveAction::Unarchive => "Unarchived",
        },
        report.succeeded,
        report.selected
    );
    Ok(output.report(&report.outcome, &summary, &report))
}
