//! Content copy and move
//!
//! A copy exports from the source hub into a scratch directory and imports
//! that directory into the destination. A move is a copy that archives the
//! exported items on the source once the import has completed; the archived
//! source IDs are logged as `ARCHIVE` entries so a revert can unarchive them.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use super::archive::{archive_content, ArchiveAction, ArchiveOptions};
use super::export::{export_content, ExportOptions};
use super::import::{ImportOptions, ImportReport, Importer};
use super::prompt::Prompt;
use super::Outcome;
use crate::hub::ContentService;
use crate::storage::ActionLog;

#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Scratch directory for the export; removed when the run ends
    pub work_dir: PathBuf,
    /// Source selection; its `dir` is replaced by `work_dir`
    pub export: ExportOptions,
    /// Destination settings; its `dir` is replaced by `work_dir`
    pub import: ImportOptions,
    /// Archive the exported items on the source after the import
    pub move_source: bool,
}

/// Summary of a copy or move
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyReport {
    pub outcome: Outcome,
    pub exported: usize,
    pub import: Option<ImportReport>,
    /// Source items archived by a move
    pub archived: usize,
    /// Source items unarchived by a move revert
    pub unarchived: usize,
    /// Source IDs that could not be archived or unarchived
    pub archive_failures: Vec<String>,
}

/// Copies content from `source` to the hub behind `importer`
///
/// With `import.revert_log` set, undoes the copy recorded in that log
/// instead: the destination import is reverted and, for a move, the source
/// items it archived are unarchived.
pub async fn copy_content(
    source: &dyn ContentService,
    importer: &Importer<'_>,
    prompt: &dyn Prompt,
    opts: &CopyOptions,
    log: &mut ActionLog,
) -> CopyReport {
    if let Some(revert_log) = &opts.import.revert_log {
        return revert_copy(source, importer, prompt, opts, revert_log.clone(), log).await;
    }

    let mut report = CopyReport::default();
    if let Err(e) = fs::create_dir_all(&opts.work_dir) {
        report.outcome = Outcome::Failed(format!(
            "Could not create the working directory {}: {}",
            opts.work_dir.display(),
            e
        ));
        return report;
    }

    log.append_line("=== Exporting from source... ===");
    let export_opts = ExportOptions {
        dir: opts.work_dir.clone(),
        ..opts.export.clone()
    };
    let exported = export_content(source, &export_opts, log).await;
    report.exported = exported.files.len();

    if exported.outcome.is_success() {
        log.append_line("=== Importing to destination... ===");
        let import_opts = ImportOptions {
            dir: opts.work_dir.clone(),
            ..opts.import.clone()
        };
        let imported = importer.run(&import_opts, log).await;
        report.outcome = imported.outcome.clone();
        report.import = Some(imported);
    } else {
        report.outcome = exported.outcome;
    }

    if let Err(e) = fs::remove_dir_all(&opts.work_dir) {
        warn!("Could not remove {}: {}", opts.work_dir.display(), e);
    }

    if report.outcome != Outcome::Completed {
        return report;
    }
    log.append_line("=== Done! ===");

    if opts.move_source {
        archive_source(source, prompt, opts, exported.exported_ids, &mut report, log).await;
    }
    report
}

async fn archive_source(
    source: &dyn ContentService,
    prompt: &dyn Prompt,
    opts: &CopyOptions,
    ids: Vec<String>,
    report: &mut CopyReport,
    log: &mut ActionLog,
) {
    if ids.is_empty() {
        return;
    }

    let archive_opts = ArchiveOptions {
        ids,
        force: opts.import.force,
        ignore_error: true,
        ..ArchiveOptions::new(ArchiveAction::Archive)
    };
    let archived = archive_content(source, prompt, &archive_opts, log).await;
    report.archived = archived.succeeded;
    report.archive_failures = archived.failed;

    report.outcome = match archived.outcome {
        Outcome::Completed if !report.archive_failures.is_empty() => Outcome::Failed(format!(
            "{} source items could not be archived",
            report.archive_failures.len()
        )),
        outcome => outcome,
    };
}

async fn revert_copy(
    source: &dyn ContentService,
    importer: &Importer<'_>,
    prompt: &dyn Prompt,
    opts: &CopyOptions,
    revert_log: PathBuf,
    log: &mut ActionLog,
) -> CopyReport {
    let mut report = CopyReport::default();

    if opts.move_source {
        let moved = match ActionLog::load_from_file(&revert_log) {
            Ok(moved) => moved,
            Err(e) => {
                report.outcome = Outcome::Failed(format!("Could not read the revert log: {:#}", e));
                return report;
            }
        };

        let ids: Vec<String> = moved.data_for("ARCHIVE").into_iter().map(str::to_string).collect();
        if !ids.is_empty() {
            let unarchive_opts = ArchiveOptions {
                ids,
                force: opts.import.force,
                ignore_error: true,
                ..ArchiveOptions::new(ArchiveAction::Unarchive)
            };
            let unarchived = archive_content(source, prompt, &unarchive_opts, log).await;
            report.unarchived = unarchived.succeeded;
            report.archive_failures = unarchived.failed;

            // Nothing left to unarchive is not an error; a declined confirmation is
            if let Outcome::Aborted(reason) = unarchived.outcome {
                if unarchived.selected > 0 {
                    report.outcome = Outcome::Aborted(reason);
                    return report;
                }
            }
        }
    }

    let imported = importer.run(&opts.import, log).await;
    report.outcome = imported.outcome.clone();
    report.import = Some(imported);
    report
}
