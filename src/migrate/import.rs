//! Content import
//!
//! Imports an export tree into a hub:
//!
//! 1. resolve targets (base folder, base repository or every repository)
//! 2. collect items, replicating the directory structure as folders
//! 3. make sure content types exist and are assigned to the repositories
//! 4. build the dependency graph and prune what cannot be imported
//! 5. create/update level by level, then circular items in two passes
//! 6. publish
//!
//! Source IDs are translated through the mapping file, so importing the same
//! tree twice updates the items created the first time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use super::folders::FolderResolver;
use super::prompt::Prompt;
use super::publish::{PublishPolicy, PublishQueue};
use super::{confirm, revert, Outcome};
use crate::domain::marker::{self, DependencyMarker};
use crate::domain::{BatchItem, ContentItem, DependencyGraph, DependencyRecord, RecordId};
use crate::hub::{
    ContentService, ContentType, ContentTypeSchema, Folder, HubResult, Publisher, Repository,
    RequiredPropertyValidator, SchemaValidator,
};
use crate::storage::{files, ActionLog, ContentMapping};

/// Where imported content goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// The import directory maps onto this folder
    Folder(String),
    /// The import directory maps onto the root of this repository
    Repository(String),
    /// Each subdirectory maps onto the repository with the same label
    Hub,
}

impl ImportTarget {
    /// Name of the default mapping file for this target
    pub fn mapping_name(&self, hub_id: &str) -> String {
        match self {
            ImportTarget::Folder(id) => format!("folder-{}", id),
            ImportTarget::Repository(id) => format!("repo-{}", id),
            ImportTarget::Hub => format!("hub-{}", hub_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub dir: PathBuf,
    pub target: ImportTarget,
    pub map_file: PathBuf,
    /// Answer yes to every question
    pub force: bool,
    /// Stop after the checks; import nothing
    pub validate_only: bool,
    /// Drop items with missing dependencies instead of nulling the links
    pub skip_incomplete: bool,
    pub publish: bool,
    /// Publish even when the import did not change the item
    pub republish: bool,
    /// Drop delivery keys and delivery IDs
    pub exclude_keys: bool,
    /// Revert the import recorded in this log instead
    pub revert_log: Option<PathBuf>,
}

impl ImportOptions {
    pub fn new(dir: impl Into<PathBuf>, target: ImportTarget, map_file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            target,
            map_file: map_file.into(),
            force: false,
            validate_only: false,
            skip_incomplete: false,
            publish: false,
            republish: false,
            exclude_keys: false,
            revert_log: None,
        }
    }
}

/// Summary of an import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub outcome: Outcome,
    pub created: usize,
    pub updated: usize,
    /// Labels of items dropped before the import
    pub skipped: Vec<String>,
    pub levels: usize,
    pub circular: usize,
    pub published: usize,
    /// Eligible items covered by publishing an item that depends on them
    pub publish_children: usize,
    pub failed_publishes: Vec<String>,
}

/// Result of one create-or-update call
#[derive(Debug, Clone)]
pub struct Written {
    pub item: ContentItem,
    /// Version before the write; 0 when the item was created
    pub old_version: u64,
}

impl Written {
    pub fn was_update(&self) -> bool {
        self.old_version > 0
    }
}

/// An import directory bound to its destination
struct TargetDir {
    repository: Repository,
    folder: Option<Folder>,
    base: PathBuf,
}

type Phase<T> = Result<T, Outcome>;

/// Creates `item`, or updates `existing` with it
///
/// An existing item is fetched first so the update carries its current
/// version; archived items are unarchived before the update. The locale is
/// set afterwards when it differs.
pub async fn create_or_update(
    service: &dyn ContentService,
    repository_id: &str,
    existing: Option<&str>,
    mut item: ContentItem,
) -> HubResult<Written> {
    let mut written = match existing {
        Some(dest_id) => {
            let mut current = service.get_content_item(dest_id).await?;
            let old_version = current.version_or_zero();
            if !current.status.is_active() {
                current = service.unarchive_content_item(&current).await?;
            }

            item.id = Some(dest_id.to_string());
            item.version = current.version;
            Written {
                item: service.update_content_item(&item).await?,
                old_version,
            }
        }
        None => {
            item.id = None;
            item.version = None;
            Written {
                item: service.create_content_item(repository_id, &item).await?,
                old_version: 0,
            }
        }
    };

    if let Some(locale) = item.locale.as_deref() {
        if written.item.locale.as_deref() != Some(locale) {
            written.item = service.set_locale(&written.item, locale).await?;
        }
    }

    Ok(written)
}

fn log_write(log: &mut ActionLog, label: &str, written: &Written) {
    let id = written.item.id.as_deref().unwrap_or("unknown");
    if written.was_update() {
        log.add_comment(&format!("Updated {}.", label));
        log.add_action(
            "UPDATE",
            format!(
                "{} {} {}",
                id,
                written.old_version,
                written.item.version_or_zero()
            ),
        );
    } else {
        log.add_comment(&format!("Created {}.", label));
        log.add_action("CREATE", id);
    }
}

fn abort(log: &mut ActionLog, reason: impl Into<String>) -> Outcome {
    let reason = reason.into();
    log.append_line(&reason);
    Outcome::Aborted(reason)
}

fn fail(log: &mut ActionLog, reason: impl Into<String>) -> Outcome {
    let reason = reason.into();
    error!("{}", reason);
    log.add_comment(&reason);
    Outcome::Failed(reason)
}

/// Body with every marker pointing at its destination ID where one is known
fn rewritten_body(record: &DependencyRecord, mapping: &ContentMapping) -> Value {
    let mut body = record.owner.content.body.clone();
    for marker in record.markers() {
        let id = mapping.get(&marker.id).unwrap_or(&marker.id);
        marker::rewrite_marker(&mut body, marker, id);
    }
    body
}

/// Body for the first circular pass: markers pointing at batch items that
/// have no destination yet are removed instead of left dangling
fn provisional_body(
    record: &DependencyRecord,
    graph: &DependencyGraph,
    mapping: &ContentMapping,
) -> Value {
    let mut body = rewritten_body(record, mapping);
    let pending: Vec<DependencyMarker> = record
        .markers()
        .filter(|m| mapping.get(&m.id).is_none() && graph.contains_id(&m.id))
        .cloned()
        .collect();

    marker::strip_markers(&mut body, &pending);
    body
}

fn label_of(graph: &DependencyGraph, idx: RecordId) -> String {
    graph
        .record(idx)
        .map(|r| r.label().to_string())
        .unwrap_or_default()
}

/// Dependency-ordered importer
pub struct Importer<'a> {
    service: &'a dyn ContentService,
    publisher: Arc<dyn Publisher>,
    prompt: &'a dyn Prompt,
    validator: Option<Arc<dyn SchemaValidator>>,
    policy: PublishPolicy,
}

impl<'a> Importer<'a> {
    pub fn new(
        service: &'a dyn ContentService,
        publisher: Arc<dyn Publisher>,
        prompt: &'a dyn Prompt,
    ) -> Self {
        Self {
            service,
            publisher,
            prompt,
            validator: None,
            policy: PublishPolicy::default(),
        }
    }

    /// Uses this validator instead of one built from the hub's schemas
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs an import (or a revert, when `revert_log` is set)
    ///
    /// The mapping file is loaded first (missing or unreadable means empty)
    /// and saved at the end, whatever the outcome, so it always reflects
    /// what was written.
    pub async fn run(&self, opts: &ImportOptions, log: &mut ActionLog) -> ImportReport {
        if let Some(revert_log) = &opts.revert_log {
            let report = revert::revert_import(self.service, self.prompt, revert_log, opts.force, log).await;
            return ImportReport {
                outcome: report.outcome,
                updated: report.reverted,
                ..ImportReport::default()
            };
        }

        let mut mapping = match ContentMapping::load(&opts.map_file) {
            Ok(mapping) => {
                log.append_line(&format!(
                    "Existing mapping loaded from '{}', changes will be saved back to it.",
                    opts.map_file.display()
                ));
                mapping
            }
            Err(_) if !opts.map_file.exists() => {
                log.append_line(&format!(
                    "Creating new mapping file at '{}'.",
                    opts.map_file.display()
                ));
                ContentMapping::new()
            }
            Err(e) => {
                warn!("Could not read the mapping file: {:#}", e);
                log.append_line(&format!(
                    "Mapping file at '{}' is unreadable, starting a new mapping in its place.",
                    opts.map_file.display()
                ));
                ContentMapping::new()
            }
        };

        let report = self.import(opts, &mut mapping, log).await;

        if let Err(e) = mapping.save(&opts.map_file) {
            log.append_line(&format!("Failed to save the mapping. {:#}", e));
        }

        report
    }

    /// Runs an import against an in-memory mapping
    pub async fn import(
        &self,
        opts: &ImportOptions,
        mapping: &mut ContentMapping,
        log: &mut ActionLog,
    ) -> ImportReport {
        let mut report = ImportReport::default();
        let outcome = match self.import_phases(opts, mapping, log, &mut report).await {
            Ok(outcome) | Err(outcome) => outcome,
        };
        report.outcome = outcome;
        report
    }

    async fn import_phases(
        &self,
        opts: &ImportOptions,
        mapping: &mut ContentMapping,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) -> Phase<Outcome> {
        let targets = self.resolve_targets(opts, log).await?;
        let (items, repositories) = self.collect(&targets, opts, log).await?;

        let graph = self
            .prepare(items, &repositories, opts, mapping, log, report)
            .await?;

        report.levels = graph.levels().len();
        report.circular = graph.circular_links().len();

        if opts.validate_only {
            log.append_line("--validate was passed, so no content was imported.");
            return Ok(Outcome::ValidatedOnly);
        }

        self.import_graph(&graph, opts, mapping, log, report)
            .await
    }

    async fn resolve_targets(&self, opts: &ImportOptions, log: &mut ActionLog) -> Phase<Vec<TargetDir>> {
        match &opts.target {
            ImportTarget::Folder(id) => {
                let folder = self
                    .service
                    .get_folder(id)
                    .await
                    .map_err(|e| fail(log, format!("Couldn't get base folder: {}", e)))?;

                let repository_id = folder.repository_id.clone().ok_or_else(|| {
                    fail(log, format!("Couldn't get the repository of folder {}", id))
                })?;
                let repository = self
                    .service
                    .get_repository(&repository_id)
                    .await
                    .map_err(|e| fail(log, format!("Couldn't get base folder: {}", e)))?;

                Ok(vec![TargetDir {
                    repository,
                    folder: Some(folder),
                    base: opts.dir.clone(),
                }])
            }
            ImportTarget::Repository(id) => {
                let repository = self
                    .service
                    .get_repository(id)
                    .await
                    .map_err(|e| fail(log, format!("Couldn't get base repository: {}", e)))?;

                Ok(vec![TargetDir {
                    repository,
                    folder: None,
                    base: opts.dir.clone(),
                }])
            }
            ImportTarget::Hub => self.match_repositories(opts, log).await,
        }
    }

    async fn match_repositories(&self, opts: &ImportOptions, log: &mut ActionLog) -> Phase<Vec<TargetDir>> {
        let repositories = self
            .service
            .list_repositories()
            .await
            .map_err(|e| fail(log, format!("Couldn't get repositories: {}", e)))?;

        let directories = files::list_subdirectories(&opts.dir)
            .map_err(|e| fail(log, format!("Couldn't read {}: {:#}", opts.dir.display(), e)))?;

        let mut targets = Vec::new();
        let mut missing = Vec::new();
        for name in directories {
            match repositories.iter().find(|r| r.label == name) {
                Some(repository) => targets.push(TargetDir {
                    repository: repository.clone(),
                    folder: None,
                    base: opts.dir.join(&name),
                }),
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            log.append_line(
                "The following repositories must exist on the destination hub to import content into them, but don't:",
            );
            for name in &missing {
                log.append_line(&format!("  {}", name));
            }

            if !targets.is_empty()
                && !confirm(
                    self.prompt,
                    opts.force,
                    "These repositories will be skipped during the import, as they need to be added to the hub manually. Do you want to continue?",
                )
            {
                return Err(abort(log, "Import cancelled."));
            }
        }

        if targets.is_empty() {
            return Err(abort(
                log,
                "Could not find any matching repositories to import into, aborting.",
            ));
        }

        Ok(targets)
    }

    async fn collect(
        &self,
        targets: &[TargetDir],
        opts: &ImportOptions,
        log: &mut ActionLog,
    ) -> Phase<(Vec<BatchItem>, HashMap<String, Repository>)> {
        let mut items = Vec::new();
        let mut repositories = HashMap::new();

        for target in targets {
            let repository = &target.repository;
            let resolver = FolderResolver::new(self.service, repository.clone(), target.folder.clone())
                .await
                .map_err(|e| {
                    fail(
                        log,
                        format!(
                            "Could not get base folders for repository {}: {}",
                            repository.label, e
                        ),
                    )
                })?;

            log.append_line(&format!(
                "Scanning structure and content in '{}' for repository '{}'...",
                target.base.display(),
                repository.label
            ));

            let paths = files::list_json_files(&target.base).map_err(|e| {
                fail(log, format!("Couldn't read {}: {:#}", target.base.display(), e))
            })?;

            // Resolve every directory up front; shared parents are created once
            let directories: Vec<PathBuf> = paths
                .iter()
                .map(|p| p.parent().map(Path::to_path_buf).unwrap_or_default())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let resolved = join_all(directories.iter().map(|d| resolver.resolve(d))).await;

            for note in resolver.take_notes() {
                log.add_comment(&note);
            }

            let mut folders = HashMap::new();
            for (directory, result) in directories.into_iter().zip(resolved) {
                let folder = result.map_err(|e| {
                    fail(
                        log,
                        format!("Couldn't get or create folder {}! {}", directory.display(), e),
                    )
                })?;
                folders.insert(directory, folder);
            }

            for path in paths {
                let full = target.base.join(&path);
                let source = match read_item(&full) {
                    Ok(item) => item,
                    Err(e) => {
                        log.append_line(&format!(
                            "Couldn't read content item at '{}': {:#}",
                            full.display(),
                            e
                        ));
                        continue;
                    }
                };

                let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
                let folder_id = folders
                    .get(&directory)
                    .and_then(|f| f.as_ref())
                    .map(|f| f.id.clone());

                items.push(filtered_item(source, folder_id, &repository.id, opts.exclude_keys));
            }

            repositories.insert(repository.id.clone(), repository.clone());
        }

        log.append_line("Done. Validating content...");
        Ok((items, repositories))
    }

    /// Type checks and graph pruning
    async fn prepare(
        &self,
        mut items: Vec<BatchItem>,
        repositories: &HashMap<String, Repository>,
        opts: &ImportOptions,
        mapping: &ContentMapping,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) -> Phase<DependencyGraph> {
        let existing = items
            .iter()
            .filter(|i| i.content.id.as_deref().is_some_and(|id| mapping.get(id).is_some()))
            .count();
        if existing > 0
            && !confirm(
                self.prompt,
                opts.force,
                &format!(
                    "{} of the items being imported already exist in the mapping. Would you like to update these content items instead of skipping them?",
                    existing
                ),
            )
        {
            items.retain(|i| {
                let mapped = i.content.id.as_deref().is_some_and(|id| mapping.get(id).is_some());
                if mapped {
                    report.skipped.push(i.content.label.clone());
                }
                !mapped
            });
        }

        let (types, schemas) = self.ensure_content_types(&items, opts, log).await?;
        self.ensure_assignments(&items, repositories, &types, opts, log)
            .await?;

        let mut graph = DependencyGraph::new(items, mapping);
        self.prune_missing_schemas(&mut graph, &types, &schemas, opts, log, report)?;

        let validator: Arc<dyn SchemaValidator> = match &self.validator {
            Some(validator) => validator.clone(),
            None => Arc::new(RequiredPropertyValidator::from_schemas(&schemas)),
        };
        self.prune_missing_dependencies(&mut graph, validator.as_ref(), opts, mapping, log, report)
            .await?;

        log.append_line(&format!(
            "Found {} dependency levels in {} items, {} referencing a circular dependency.",
            graph.levels().len(),
            graph.len(),
            graph.circular_links().len()
        ));
        log.append_line(&format!("Importing {} content items...", graph.len()));

        Ok(graph)
    }

    /// Registers content types for schemas that exist without one
    async fn ensure_content_types(
        &self,
        items: &[BatchItem],
        opts: &ImportOptions,
        log: &mut ActionLog,
    ) -> Phase<(Vec<ContentType>, Vec<ContentTypeSchema>)> {
        let (types, schemas) = futures::join!(
            self.service.list_content_types(),
            self.service.list_content_type_schemas()
        );
        let mut types = types.map_err(|e| fail(log, format!("Could not load content types: {}", e)))?;
        let schemas = schemas.map_err(|e| fail(log, format!("Could not load content types: {}", e)))?;

        let schema_names: BTreeSet<&str> = items.iter().filter_map(|i| i.content.schema()).collect();
        let missing_types: Vec<&str> = schema_names
            .into_iter()
            .filter(|name| !types.iter().any(|t| t.content_type_uri == *name))
            .collect();

        if missing_types.is_empty() {
            return Ok((types, schemas));
        }

        log.append_line("Required content types are missing from the target hub.");
        let registrable: Vec<&ContentTypeSchema> = schemas
            .iter()
            .filter(|s| missing_types.contains(&s.schema_id.as_str()))
            .collect();

        if registrable.is_empty() {
            return Ok((types, schemas));
        }

        log.append_line("The following required content types schemas exist, but do not exist as content types:");
        for schema in &registrable {
            log.append_line(&format!("  {}", schema.schema_id));
        }

        if !confirm(
            self.prompt,
            opts.force,
            "Content types can be automatically created for these schemas, but it is not recommended as they will have a default name and lack any configuration. Are you sure you wish to continue?",
        ) {
            return Err(abort(log, "Import cancelled."));
        }

        for schema in registrable {
            let label = schema
                .schema_id
                .rsplit('/')
                .next()
                .unwrap_or(&schema.schema_id);
            let registered = self
                .service
                .register_content_type(&schema.schema_id, label)
                .await
                .map_err(|e| {
                    fail(
                        log,
                        format!("Failed to register content type {}: {}", schema.schema_id, e),
                    )
                })?;
            types.push(registered);
        }

        Ok((types, schemas))
    }

    /// Assigns used content types to the repositories that lack them
    async fn ensure_assignments(
        &self,
        items: &[BatchItem],
        repositories: &HashMap<String, Repository>,
        types: &[ContentType],
        opts: &ImportOptions,
        log: &mut ActionLog,
    ) -> Phase<()> {
        let mut missing: Vec<(&Repository, &ContentType)> = Vec::new();
        let mut seen = HashSet::new();

        for item in items {
            let (Some(repository_id), Some(schema)) = (&item.repository_id, item.content.schema()) else {
                continue;
            };
            let (Some(repository), Some(content_type)) = (
                repositories.get(repository_id),
                types.iter().find(|t| t.content_type_uri == schema),
            ) else {
                continue;
            };

            let assigned = repository
                .content_types
                .iter()
                .any(|t| t.hub_content_type_id == content_type.id);
            if !assigned && seen.insert((repository.id.clone(), content_type.id.clone())) {
                missing.push((repository, content_type));
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        log.append_line(
            "Some content items are using types incompatible with the target repository. Missing assignments:",
        );
        for (repository, content_type) in &missing {
            let label = if content_type.settings.label.is_empty() {
                "<no label>"
            } else {
                content_type.settings.label.as_str()
            };
            log.append_line(&format!(
                "  {} - {} ({})",
                repository.label, label, content_type.content_type_uri
            ));
        }

        if !confirm(
            self.prompt,
            opts.force,
            "These assignments will be created automatically. Are you sure you still wish to continue?",
        ) {
            return Err(abort(log, "Import cancelled."));
        }

        let results = join_all(
            missing
                .iter()
                .map(|(repository, content_type)| {
                    self.service
                        .assign_content_type(&repository.id, &content_type.id)
                }),
        )
        .await;

        if let Some(e) = results.into_iter().find_map(Result::err) {
            return Err(fail(log, format!("Failed creating repo assignments. Error: {}", e)));
        }
        Ok(())
    }

    fn prune_missing_schemas(
        &self,
        graph: &mut DependencyGraph,
        types: &[ContentType],
        schemas: &[ContentTypeSchema],
        opts: &ImportOptions,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) -> Phase<()> {
        let missing: Vec<String> = graph
            .required_schema()
            .iter()
            .filter(|id| {
                !schemas.iter().any(|s| &s.schema_id == *id)
                    && !types.iter().any(|t| &t.content_type_uri == *id)
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        log.append_line("Required content type schema are missing from the target hub:");
        for schema in &missing {
            log.append_line(&format!("  {}", schema));
        }
        log.append_line("All content referencing this content type schema, and any content depending on those items will be skipped.");

        let affected = graph.filter_any(false, |r| {
            r.schema().is_some_and(|s| missing.iter().any(|m| m == s))
        });
        let before = graph.len();
        report
            .skipped
            .extend(affected.iter().map(|idx| label_of(graph, *idx)));
        graph.remove_content(&affected);

        if graph.is_empty() {
            return Err(abort(
                log,
                "No content remains after removing those with missing content type schemas. Aborting.",
            ));
        }

        if !confirm(
            self.prompt,
            opts.force,
            &format!(
                "{} out of {} content items will be skipped. Are you sure you still wish to continue?",
                affected.len(),
                before
            ),
        ) {
            return Err(abort(log, "Import cancelled."));
        }

        Ok(())
    }

    /// Handles markers whose target is neither in the batch nor mapped
    ///
    /// With `skip_incomplete` the affected items are dropped. Otherwise the
    /// missing markers are removed from each affected body, and the item is
    /// dropped only if the body no longer validates.
    async fn prune_missing_dependencies(
        &self,
        graph: &mut DependencyGraph,
        validator: &dyn SchemaValidator,
        opts: &ImportOptions,
        mapping: &ContentMapping,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) -> Phase<()> {
        let total = graph.len();
        let mut missing_ids = BTreeSet::new();
        for (idx, _) in graph.records() {
            for marker in graph.missing_dependencies(idx, mapping) {
                missing_ids.insert(marker.id.clone());
            }
        }

        let invalid = find_incomplete(graph, mapping);
        if invalid.is_empty() {
            return Ok(());
        }
        let invalid_labels: Vec<String> = invalid.iter().map(|idx| label_of(graph, *idx)).collect();

        if opts.skip_incomplete {
            let mut remove = invalid.clone();
            // Removing items can leave others pointing at nothing; repeat until stable
            while !remove.is_empty() {
                report
                    .skipped
                    .extend(remove.iter().map(|idx| label_of(graph, *idx)));
                graph.remove_content(&remove);
                remove = find_incomplete(graph, mapping);
            }
        } else {
            // Skipping an item leaves its dependants pointing at nothing; repeat until stable
            let mut pending = invalid.clone();
            while !pending.is_empty() {
                let must_skip = strip_and_validate(graph, &pending, validator, mapping).await;
                if must_skip.is_empty() {
                    break;
                }

                log.append_line("Required dependencies for the following content items are missing, and would cause validation errors if set null.");
                log.append_line("These items will be skipped:");
                for idx in &must_skip {
                    let label = label_of(graph, *idx);
                    log.append_line(&format!("  {}", label));
                    report.skipped.push(label);
                }
                graph.remove_content(&must_skip);
                pending = find_incomplete(graph, mapping);
            }
        }

        log.append_line("Referenced content items (targets of links/references) are missing from the import and mapping:");
        for id in &missing_ids {
            log.append_line(&format!("  {}", id));
        }
        let action = if opts.skip_incomplete {
            "skipped"
        } else {
            "set as null"
        };
        log.append_line(&format!(
            "All references to these content items will be {}. Note: if you have already imported these items before, make sure you are using a mapping file from that import.",
            action
        ));

        if graph.is_empty() {
            return Err(abort(
                log,
                "No content remains after removing those with missing dependencies. Aborting.",
            ));
        }

        for label in &invalid_labels {
            log.append_line(&format!("  {}", label));
        }

        if !confirm(
            self.prompt,
            opts.force,
            &format!(
                "{} out of {} content items will be affected. Are you sure you still wish to continue?",
                invalid_labels.len(),
                total
            ),
        ) {
            return Err(abort(log, "Import cancelled."));
        }

        graph.compute_levels(mapping);
        Ok(())
    }

    async fn write_record(
        &self,
        graph: &DependencyGraph,
        idx: RecordId,
        body: Value,
        existing: Option<&str>,
    ) -> HubResult<Option<Written>> {
        let Some(record) = graph.record(idx) else {
            return Ok(None);
        };

        let mut item = record.owner.content.clone();
        item.body = body;
        let repository_id = record.owner.repository_id.as_deref().unwrap_or_default();

        create_or_update(self.service, repository_id, existing, item)
            .await
            .map(Some)
    }

    async fn import_graph(
        &self,
        graph: &DependencyGraph,
        opts: &ImportOptions,
        mapping: &mut ContentMapping,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) -> Phase<Outcome> {
        let mut publishable: Vec<(ContentItem, RecordId)> = Vec::new();
        let levels: Vec<Vec<RecordId>> = graph.levels().to_vec();

        for level in &levels {
            for idx in level {
                let Some(record) = graph.record(*idx) else {
                    continue;
                };
                let label = record.label().to_string();
                let source_id = record.source_id().map(str::to_string);
                let should_publish = record.owner.publish;
                let body = rewritten_body(record, mapping);
                let existing = source_id
                    .as_deref()
                    .and_then(|id| mapping.get(id))
                    .map(str::to_string);

                let written = match self.write_record(graph, *idx, body, existing.as_deref()).await {
                    Ok(Some(written)) => written,
                    Ok(None) => continue,
                    Err(e) => {
                        log.append_line(&format!("Failed creating {}.", label));
                        return Err(fail(
                            log,
                            format!("Importing content item failed, aborting. Error: {}", e),
                        ));
                    }
                };

                self.record_write(&label, &written, log, report);
                if should_publish
                    && (written.item.version_or_zero() != written.old_version || opts.republish)
                {
                    publishable.push((written.item.clone(), *idx));
                }
                if let (Some(source_id), Some(dest_id)) = (source_id, written.item.id.clone()) {
                    mapping.register(source_id, dest_id);
                }
            }
        }

        // Publishing an item publishes what it links to
        let eligible: HashSet<RecordId> = publishable.iter().map(|(_, idx)| *idx).collect();
        let before = publishable.len();
        publishable.retain(|(_, idx)| {
            !graph
                .traverse_dependants(*idx, true)
                .iter()
                .any(|d| d != idx && eligible.contains(d))
        });
        report.publish_children = before - publishable.len();

        self.import_circular(graph, opts, mapping, log, report, &mut publishable)
            .await?;

        if opts.publish || opts.republish {
            self.publish_all(publishable, log, report).await;
        }

        log.append_line("Done!");
        Ok(Outcome::Completed)
    }

    fn record_write(&self, label: &str, written: &Written, log: &mut ActionLog, report: &mut ImportReport) {
        log_write(log, label, written);
        if written.was_update() {
            report.updated += 1;
        } else {
            report.created += 1;
        }
    }

    /// Two passes over the circular items
    ///
    /// Pass 1 creates or updates every item with links to not-yet-created
    /// batch items removed; pass 2 writes the fully rewritten bodies once
    /// every item has a destination ID. Log entries carry the pass 2 version.
    async fn import_circular(
        &self,
        graph: &DependencyGraph,
        opts: &ImportOptions,
        mapping: &mut ContentMapping,
        log: &mut ActionLog,
        report: &mut ImportReport,
        publishable: &mut Vec<(ContentItem, RecordId)>,
    ) -> Phase<()> {
        let circular: Vec<RecordId> = graph.circular_links().to_vec();
        if circular.is_empty() {
            return Ok(());
        }

        let mut first_pass: Vec<(RecordId, String, Written)> = Vec::new();

        log.append_line("Creating circular dependants.");
        for idx in &circular {
            let Some(record) = graph.record(*idx) else {
                continue;
            };
            let label = record.label().to_string();
            let source_id = record.source_id().map(str::to_string);
            let body = provisional_body(record, graph, mapping);
            let existing = source_id
                .as_deref()
                .and_then(|id| mapping.get(id))
                .map(str::to_string);

            match self.write_record(graph, *idx, body, existing.as_deref()).await {
                Ok(Some(written)) => {
                    if let (Some(source_id), Some(dest_id)) = (source_id, written.item.id.clone()) {
                        mapping.register(source_id, dest_id);
                    }
                    first_pass.push((*idx, label, written));
                }
                Ok(None) => {}
                Err(e) => {
                    for (_, label, written) in &first_pass {
                        self.record_write(label, written, log, report);
                    }
                    log.append_line(&format!("Failed creating {}.", label));
                    return Err(fail(
                        log,
                        format!("Importing content item failed, aborting. Error: {}", e),
                    ));
                }
            }
        }

        log.append_line("Resolving circular dependants.");
        for (position, (idx, label, first)) in first_pass.iter().enumerate() {
            let Some(record) = graph.record(*idx) else {
                continue;
            };
            let body = rewritten_body(record, mapping);
            let dest_id = first.item.id.clone();

            match self.write_record(graph, *idx, body, dest_id.as_deref()).await {
                Ok(Some(second)) => {
                    let written = Written {
                        item: second.item,
                        old_version: first.old_version,
                    };
                    self.record_write(label, &written, log, report);

                    if record.owner.publish
                        && (written.item.version_or_zero() != written.old_version || opts.republish)
                    {
                        publishable.push((written.item, *idx));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    for (_, label, written) in &first_pass[position..] {
                        self.record_write(label, written, log, report);
                    }
                    log.append_line(&format!("Failed resolving {}.", label));
                    return Err(fail(
                        log,
                        format!("Importing content item failed, aborting. Error: {}", e),
                    ));
                }
            }
        }

        Ok(())
    }

    async fn publish_all(
        &self,
        publishable: Vec<(ContentItem, RecordId)>,
        log: &mut ActionLog,
        report: &mut ImportReport,
    ) {
        let mut queue = PublishQueue::new(self.publisher.clone(), self.policy);
        log.append_line(&format!(
            "Publishing {} items. ({} children included)",
            publishable.len(),
            report.publish_children
        ));

        for (item, _) in publishable {
            let label = item.label.clone();
            match queue.publish(item).await {
                Ok(()) => log.append_line(&format!("Started publish for {}.", label)),
                Err(e) => {
                    log.append_line(&format!("Failed to initiate publish for {}: {}", label, e));
                    report.failed_publishes.push(label);
                }
            }
        }

        log.append_line("Waiting for all publishes to complete...");
        queue.wait_for_all().await;

        report.published = queue.completed();
        report
            .failed_publishes
            .extend(queue.failed_jobs().iter().map(|job| job.item.label.clone()));

        log.append_line(&format!(
            "Finished publishing, with {} failed publishes total.",
            report.failed_publishes.len()
        ));
        for label in &report.failed_publishes {
            log.append_line(&format!(" - {}", label));
        }
    }
}

/// Strips the unresolvable markers of each record and returns the records
/// whose stripped body no longer validates
async fn strip_and_validate(
    graph: &mut DependencyGraph,
    records: &[RecordId],
    validator: &dyn SchemaValidator,
    mapping: &ContentMapping,
) -> Vec<RecordId> {
    let mut invalid = Vec::new();
    for idx in records {
        let markers: Vec<DependencyMarker> = graph
            .missing_dependencies(*idx, mapping)
            .into_iter()
            .cloned()
            .collect();
        if graph.strip_dependencies(*idx, &markers) == 0 {
            continue;
        }

        let Some(record) = graph.record(*idx) else {
            continue;
        };
        match validator.validate(&record.owner.content.body).await {
            Ok(errors) if !errors.is_empty() => invalid.push(*idx),
            Ok(_) => {}
            Err(e) => warn!("Could not validate {}: {}", record.label(), e),
        }
    }
    invalid
}

/// Items with a dependency that resolves neither in the batch nor in the mapping,
/// together with everything they are a dependant of
fn find_incomplete(graph: &DependencyGraph, mapping: &ContentMapping) -> Vec<RecordId> {
    graph.filter_any(false, |record| {
        record
            .markers()
            .any(|m| !graph.contains_id(&m.id) && mapping.get(&m.id).is_none())
    })
}

fn read_item(path: &Path) -> anyhow::Result<ContentItem> {
    use anyhow::Context;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Keeps the fields an import writes
fn filtered_item(
    source: ContentItem,
    folder_id: Option<String>,
    repository_id: &str,
    exclude_keys: bool,
) -> BatchItem {
    let delivery_id = if exclude_keys || source.delivery_id == source.id {
        None
    } else {
        source.delivery_id.clone()
    };

    let mut content = ContentItem {
        id: source.id.clone(),
        label: source.label.clone(),
        locale: source.locale.clone(),
        body: source.body.clone(),
        delivery_id,
        folder_id,
        ..ContentItem::default()
    };
    if exclude_keys {
        content.remove_delivery_key();
    }

    BatchItem {
        content,
        repository_id: Some(repository_id.to_string()),
        publish: source.last_published_version.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryHub;
    use serde_json::json;

    #[tokio::test]
    async fn create_or_update_creates_without_mapping() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");

        let item = ContentItem::new("A", json!({ "_meta": { "schema": "s" } })).with_id("src-1");
        let written = create_or_update(&hub, &repo.id, None, item).await.unwrap();

        assert!(!written.was_update());
        assert_ne!(written.item.id.as_deref(), Some("src-1"));
        assert_eq!(hub.counters().creates, 1);
    }

    #[tokio::test]
    async fn create_or_update_unarchives_and_sets_locale() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let existing = hub.insert_item(&repo.id, ContentItem::new("A", json!({})));
        let archived = hub.archive_content_item(&existing).await.unwrap();

        let mut item = ContentItem::new("A", json!({ "v": 2 }));
        item.locale = Some("en-GB".to_string());
        let written = create_or_update(&hub, &repo.id, archived.id.as_deref(), item)
            .await
            .unwrap();

        assert!(written.was_update());
        assert_eq!(written.old_version, 2);
        assert_eq!(written.item.locale.as_deref(), Some("en-GB"));
        assert_eq!(written.item.status, crate::domain::ContentStatus::Active);
        assert_eq!(written.item.body, json!({ "v": 2 }));
    }

    #[test]
    fn filtered_item_drops_redundant_delivery_id() {
        let mut source = ContentItem::new(
            "A",
            json!({ "_meta": { "schema": "s", "deliveryKey": "home" } }),
        )
        .with_id("x");
        source.delivery_id = Some("x".to_string());
        source.last_published_version = Some(3);
        source.version = Some(9);

        let batch = filtered_item(source.clone(), Some("f1".to_string()), "r1", false);
        assert!(batch.content.delivery_id.is_none());
        assert!(batch.content.version.is_none());
        assert!(batch.publish);
        assert_eq!(batch.content.folder_id.as_deref(), Some("f1"));

        source.delivery_id = Some("other".to_string());
        let kept = filtered_item(source.clone(), None, "r1", false);
        assert_eq!(kept.content.delivery_id.as_deref(), Some("other"));

        let excluded = filtered_item(source, None, "r1", true);
        assert!(excluded.content.delivery_id.is_none());
        assert!(excluded.content.body.pointer("/_meta/deliveryKey").is_none());
    }

    #[test]
    fn provisional_body_drops_links_to_uncreated_batch_items() {
        let link = |id: &str| {
            json!({ "_meta": { "schema": marker::CONTENT_LINK_SCHEMA }, "contentType": "c", "id": id })
        };
        let a = BatchItem::new(
            ContentItem::new("A", json!({ "links": [link("B"), link("ext")] })).with_id("A"),
            None,
        );
        let b = BatchItem::new(
            ContentItem::new("B", json!({ "links": [link("A")] })).with_id("B"),
            None,
        );

        let mut mapping = ContentMapping::new();
        mapping.register("ext", "dest-ext");
        let graph = DependencyGraph::new(vec![a, b], &mapping);

        let record = graph.record(graph.by_id("A").unwrap()).unwrap();
        let body = provisional_body(record, &graph, &mapping);
        assert_eq!(body["links"], json!([link("dest-ext")]));

        mapping.register("B", "dest-b");
        let body = rewritten_body(record, &mapping);
        assert_eq!(body["links"], json!([link("dest-b"), link("dest-ext")]));
    }

    #[test]
    fn mapping_names() {
        assert_eq!(ImportTarget::Folder("f".into()).mapping_name("h"), "folder-f");
        assert_eq!(ImportTarget::Repository("r".into()).mapping_name("h"), "repo-r");
        assert_eq!(ImportTarget::Hub.mapping_name("h"), "hub-h");
    }
}
