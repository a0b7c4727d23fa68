//! # Migration Orchestrators
//!
//! Import, export, import revert, copy/move and archive/unarchive runs. Each run is a
//! sequence of guarded phases; a phase that cannot continue stops the run
//! with an [`Outcome`] explaining why instead of an error.
//!
//! ## Key Types
//!
//! - [`Importer`] - Dependency-ordered import of an export tree
//! - [`export_content`] - Export of repositories/folders with dependency completion
//! - [`revert_import`] - Undo of a previous import from its action log
//! - [`archive_content`] - Bulk archive/unarchive
//! - [`copy_content`] - Export from one hub and import into another, optionally archiving the source
//! - [`PublishQueue`] - Bounded-concurrency publishing

mod archive;
mod copy;
mod export;
mod folders;
mod import;
mod prompt;
mod publish;
mod revert;

pub use archive::{archive_content, ArchiveAction, ArchiveOptions, ArchiveReport};
pub use copy::{copy_content, CopyOptions, CopyReport};
pub use export::{export_content, ExportOptions, ExportReport};
pub use folders::FolderResolver;
pub use import::{create_or_update, ImportOptions, ImportReport, ImportTarget, Importer, Written};
pub use prompt::{AutoPrompt, Prompt, StdinPrompt};
pub use publish::{PublishJob, PublishOutcome, PublishPolicy, PublishQueue};
pub use revert::{revert_import, RevertReport};

use serde::Serialize;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Completed,
    /// Checks ran but nothing was written
    ValidatedOnly,
    /// Stopped before writing anything, usually at a confirmation
    Aborted(String),
    /// A write failed; earlier writes stay committed
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed | Outcome::ValidatedOnly)
    }
}

/// Asks a question unless `force` answers it
fn confirm(prompt: &dyn Prompt, force: bool, question: &str) -> bool {
    if force {
        return true;
    }

    match prompt.confirm(question) {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!("Could not read an answer: {}", e);
            false
        }
    }
}
