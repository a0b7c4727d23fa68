//! `import` command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::app::connect;
use super::output::Output;
use crate::migrate::{ImportOptions, ImportTarget, Importer, PublishPolicy, StdinPrompt};
use crate::storage::{ActionLog, Config};

#[derive(Args)]
pub struct ImportArgs {
    /// Directory containing the content items to import
    pub dir: PathBuf,

    /// Import into this repository; the directory maps onto its root
    #[arg(long, conflicts_with = "base_folder")]
    pub base_repo: Option<String>,

    /// Import into this folder
    #[arg(long)]
    pub base_folder: Option<String>,

    /// Mapping file to read and update (defaults to one per target)
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

    /// Publish imported items that were published on the source
    #[arg(long)]
    pub publish: bool,

    /// Publish even items the import did not change
    #[arg(long)]
    pub republish: bool,

    /// Do not import delivery keys or delivery IDs
    #[arg(long)]
    pub exclude_keys: bool,

    /// Revert the import recorded in this log instead
    #[arg(long)]
    pub revert_log: Option<PathBuf>,

    /// Log file to write (`<DATE>` is replaced by a timestamp)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn run(args: ImportArgs, config: &Config, output: &Output) -> Result<bool> {
    let hub = connect(config)?;
    let hub_id = config.require_hub_id()?;

    let target = match (args.base_folder, args.base_repo) {
        (Some(folder), _) => ImportTarget::Folder(folder),
        (None, Some(repo)) => ImportTarget::Repository(repo),
        (None, None) => ImportTarget::Hub,
    };
    let map_file = args
        .map_file
        .unwrap_or_else(|| config.default_mapping_path(&target.mapping_name(hub_id)));
    output.verbose_ctx("import", &format!("Mapping file: {}", map_file.display()));

    let opts = ImportOptions {
        force: args.force,
        validate_only: args.validate,
        skip_incomplete: args.skip_incomplete,
        publish: args.publish || args.republish,
        republish: args.republish,
        exclude_keys: args.exclude_keys,
        revert_log: args.revert_log,
        ..ImportOptions::new(args.dir, target, map_file)
    };

    let action = if opts.revert_log.is_some() { "import-revert" } else { "import" };
    let log_path = args
        .log_file
        .unwrap_or_else(|| config.default_log_path("item", action));
    let mut log = ActionLog::to_file(format!("hubmigrate {}", action), &log_path);

    let prompt = StdinPrompt;
    let importer = Importer::new(hub.as_ref(), hub.clone(), &prompt)
        .with_policy(PublishPolicy::from(&config.publish));
    let report = importer.run(&opts, &mut log).await;
    log.close();

    let mut summary = format!(
        "Imported content: {} created, {} updated, {} skipped.",
        report.created,
        report.updated,
        report.skipped.len()
    );
    if opts.publish {
        summary.push_str(&format!(
            " Published {}, {} failed.",
            report.published,
            report.failed_publishes.len()
        ));
    }

    Ok(output.report(&report.outcome, &summary, &report))
}
