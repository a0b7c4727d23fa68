//! `export` command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::app::connect;
use super::output::Output;
use crate::migrate::{export_content, ExportOptions};
use crate::storage::{ActionLog, Config};

#[derive(Args)]
pub struct ExportArgs {
    /// Output directory for the exported content items
    pub dir: PathBuf,

    /// Export this repository, including all of its folders (repeatable)
    #[arg(long = "repo-id")]
    pub repo_ids: Vec<String>,

    /// Export this folder and its subfolders (repeatable)
    #[arg(long = "folder-id")]
    pub folder_ids: Vec<String>,

    /// Only export items with this schema ID; `/regex/` allowed (repeatable)
    #[arg(long = "schema-id")]
    pub schema_ids: Vec<String>,

    /// Only export items with this name; `/regex/` allowed (repeatable)
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Export the last published version of each item where there is one
    #[arg(long)]
    pub publish: bool,

    /// Log file to write (`<DATE>` is replaced by a timestamp)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: ExportArgs, config: &Config, output: &Output) -> Result<bool> {
    let hub = connect(config)?;

    let log_path = args
        .log_file
        .unwrap_or_else(|| config.default_log_path("item", "export"));
    let mut log = ActionLog::to_file("hubmigrate export", &log_path);

    let opts = ExportOptions {
        dir: args.dir,
        repo_ids: args.repo_ids,
        folder_ids: args.folder_ids,
        schema_ids: args.schema_ids,
        names: args.names,
        publish: args.publish,
    };
    output.verbose_ctx("export", &format!("Exporting to {}", opts.dir.display()));

    let report = export_content(hub.as_ref(), &opts, &mut log).await;
    log.close();

    let summary = format!(
        "Exported {} content items ({} referenced dependencies) to {}.",
        report.files.len(),
        report.dependencies,
        opts.dir.display()
    );
    Ok(output.report(&report.outcome, &summary, &report))
}
