//! `copy` and `move` commands

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::app::connect;
use super::output::Output;
use crate::migrate::{
    copy_content, CopyOptions, ExportOptions, ImportOptions, ImportTarget, Importer, PublishPolicy,
    StdinPrompt,
};
use crate::storage::{ActionLog, Config};

#[derive(Args)]
pub struct CopyArgs {
    /// Copy this source repository, including all of its folders (repeatable)
    #[arg(long = "src-repo")]
    pub src_repos: Vec<String>,

    /// Copy this source folder and its subfolders (repeatable)
    #[arg(long = "src-folder")]
    pub src_folders: Vec<String>,

    /// Only copy items with this schema ID; `/regex/` allowed (repeatable)
    #[arg(long = "schema-id")]
    pub schema_ids: Vec<String>,

    /// Only copy items with this name; `/regex/` allowed (repeatable)
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Copy the last published version of each item where there is one
    #[arg(long)]
    pub last_publish: bool,

    /// Destination repository
    #[arg(long, conflicts_with = "dst_folder")]
    pub dst_repo: Option<String>,

    /// Destination folder
    #[arg(long)]
    pub dst_folder: Option<String>,

    /// Destination hub (defaults to the source hub)
    #[arg(long, env = "HUB_MIGRATE_DST_HUB_ID")]
    pub dst_hub_id: Option<String>,

    /// Base URL of the destination content API
    #[arg(long, env = "HUB_MIGRATE_DST_BASE_URL")]
    pub dst_base_url: Option<String>,

    /// Destination API bearer token
    #[arg(long, env = "HUB_MIGRATE_DST_TOKEN", hide_env_values = true)]
    pub dst_token: Option<String>,

    /// Mapping file to read and update (defaults to one per destination)
    #[arg(long)]
    pub map_file: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(long)]
    pub force: bool,

    /// Only check the content, import nothing
    #[arg(long)]
    pub validate: bool,

    /// Skip items with missing dependencies instead of removing the links
    #[arg(long)]
    pub skip_incomplete: bool,

    /// Publish copied items that were published on the source
    #[arg(long)]
    pub publish: bool,

    /// Publish even items the copy did not change
    #[arg(long)]
    pub republish: bool,

    /// Do not copy delivery keys or delivery IDs
    #[arg(long)]
    pub exclude_keys: bool,

    /// Revert the copy recorded in this log instead
    #[arg(long)]
    pub revert_log: Option<PathBuf>,

    /// Log file to write (`<DATE>` is replaced by a timestamp)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: CopyArgs, move_source: bool, config: &Config, output: &Output) -> Result<bool> {
    let source = connect(config)?;
    let dst_config = config
        .clone()
        .with_overrides(args.dst_hub_id, args.dst_base_url, args.dst_token);
    let destination = connect(&dst_config)?;
    let dst_hub_id = dst_config.require_hub_id()?;

    let target = match (args.dst_folder, args.dst_repo) {
        (Some(folder), _) => ImportTarget::Folder(folder),
        (None, Some(repo)) => ImportTarget::Repository(repo),
        (None, None) => ImportTarget::Hub,
    };
    let map_file = args
        .map_file
        .unwrap_or_else(|| config.default_mapping_path(&target.mapping_name(dst_hub_id)));
    output.verbose_ctx("copy", &format!("Mapping file: {}", map_file.display()));

    let work_dir = config
        .data_dir()
        .join(format!("copy-{}", chrono::Utc::now().timestamp_millis()));

    let opts = CopyOptions {
        export: ExportOptions {
            repo_ids: args.src_repos,
            folder_ids: args.src_folders,
            schema_ids: args.schema_ids,
            names: args.names,
            publish: args.last_publish,
            ..ExportOptions::default()
        },
        import: ImportOptions {
            force: args.force,
            validate_only: args.validate,
            skip_incomplete: args.skip_incomplete,
            publish: args.publish || args.republish,
            republish: args.republish,
            exclude_keys: args.exclude_keys,
            revert_log: args.revert_log,
            ..ImportOptions::new(&work_dir, target, map_file)
        },
        work_dir,
        move_source,
    };

    let verb = if move_source { "move" } else { "copy" };
    let action = if opts.import.revert_log.is_some() {
        format!("{}-revert", verb)
    } else {
        verb.to_string()
    };
    let log_path = args
        .log_file
        .unwrap_or_else(|| config.default_log_path("item", &action));
    let mut log = ActionLog::to_file(format!("hubmigrate {}", action), &log_path);

    let prompt = StdinPrompt;
    let importer = Importer::new(destination.as_ref(), destination.clone(), &prompt)
        .with_policy(PublishPolicy::from(&config.publish));
    let report = copy_content(source.as_ref(), &importer, &prompt, &opts, &mut log).await;
    log.close();

    let (created, updated) = report
        .import
        .as_ref()
        .map_or((0, 0), |import| (import.created, import.updated));
    let mut summary = format!(
        "Exported {} items; {} created, {} updated on the destination.",
        report.exported, created, updated
    );
    if move_source {
        summary.push_str(&format!(
            " Archived {}, unarchived {}, {} failed on the source.",
            report.archived,
            report.unarchived,
            report.archive_failures.len()
        ));
    }

    Ok(output.report(&report.outcome, &summary, &report))
}
