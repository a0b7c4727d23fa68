//! In-memory content service
//!
//! A complete hub held in process memory. Used by the integration tests and
//! handy for dry runs against fixture data. Keeps every version of every
//! item, enforces the version check on update, counts mutating calls and
//! can be told to fail specific items.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::model::{
    ContentType, ContentTypeSchema, ContentTypeSettings, Folder, PublishJobState, Repository,
    RepositoryContentType,
};
use super::service::{ContentService, HubError, HubResult, Publisher};
use crate::domain::{ContentItem, ContentStatus};

/// Number of mutating calls made against a [`MemoryHub`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubCounters {
    pub creates: usize,
    pub updates: usize,
    pub archives: usize,
    pub unarchives: usize,
    pub publishes: usize,
    pub folders_created: usize,
}

#[derive(Debug)]
struct PublishRecord {
    item_id: String,
    polls_left: u32,
    fail: bool,
    finished: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    repositories: Vec<Repository>,
    folders: Vec<Folder>,
    /// Every version of every item, newest last
    items: BTreeMap<String, Vec<ContentItem>>,
    content_types: Vec<ContentType>,
    schemas: Vec<ContentTypeSchema>,
    counters: HubCounters,
    failing_labels: HashSet<String>,
    failing_publish_labels: HashSet<String>,
    publish_polls: u32,
    jobs: HashMap<String, PublishRecord>,
    active_publishes: usize,
    max_active_publishes: usize,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn current(&self, id: &str) -> HubResult<&ContentItem> {
        self.items
            .get(id)
            .and_then(|versions| versions.last())
            .ok_or_else(|| HubError::not_found("content item", id))
    }

    fn check_failure(&self, label: &str) -> HubResult<()> {
        if self.failing_labels.contains(label) {
            return Err(HubError::Api {
                status: 500,
                message: format!("injected failure for '{}'", label),
            });
        }
        Ok(())
    }

    /// Stores a new version of an existing item
    fn push_version(&mut self, id: &str, mut next: ContentItem) -> HubResult<ContentItem> {
        let current = self.current(id)?;
        next.version = Some(current.version_or_zero() + 1);
        next.id = Some(id.to_string());
        next.content_repository_id = current.content_repository_id.clone();

        if let Some(versions) = self.items.get_mut(id) {
            versions.push(next.clone());
        }
        Ok(next)
    }
}

/// Content service backed by process memory
#[derive(Debug)]
pub struct MemoryHub {
    state: Mutex<State>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                publish_polls: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a repository with the given name and label
    pub fn add_repository(&self, name: &str, label: &str) -> Repository {
        let mut state = self.state();
        let repository = Repository {
            id: state.next_id("repo"),
            name: name.to_string(),
            label: label.to_string(),
            content_types: vec![],
        };
        state.repositories.push(repository.clone());
        repository
    }

    /// Adds a folder under a parent folder, or at the repository root
    pub fn add_folder(&self, repository_id: &str, parent_id: Option<&str>, name: &str) -> Folder {
        let mut state = self.state();
        let folder = Folder {
            id: state.next_id("folder"),
            name: name.to_string(),
            repository_id: Some(repository_id.to_string()),
            parent_id: parent_id.map(str::to_string),
        };
        state.folders.push(folder.clone());
        folder
    }

    /// Adds a content type schema document
    pub fn add_schema(&self, schema_id: &str, body: &Value) {
        let mut state = self.state();
        let schema = ContentTypeSchema {
            id: state.next_id("schema"),
            schema_id: schema_id.to_string(),
            body: body.to_string(),
        };
        state.schemas.push(schema);
    }

    /// Registers a content type and assigns it to the given repositories
    pub fn add_content_type(&self, schema_uri: &str, repository_ids: &[&str]) -> ContentType {
        let mut state = self.state();
        let content_type = ContentType {
            id: state.next_id("type"),
            content_type_uri: schema_uri.to_string(),
            settings: ContentTypeSettings {
                label: schema_uri.to_string(),
            },
        };
        state.content_types.push(content_type.clone());

        for repository in state
            .repositories
            .iter_mut()
            .filter(|r| repository_ids.contains(&r.id.as_str()))
        {
            repository.content_types.push(RepositoryContentType {
                hub_content_type_id: content_type.id.clone(),
                content_type_uri: schema_uri.to_string(),
            });
        }
        content_type
    }

    /// Inserts an item without counting it as a create
    pub fn insert_item(&self, repository_id: &str, mut item: ContentItem) -> ContentItem {
        let mut state = self.state();
        let id = match item.id.clone() {
            Some(id) => id,
            None => state.next_id("item"),
        };
        item.id = Some(id.clone());
        item.version = Some(item.version.unwrap_or(1));
        item.content_repository_id = Some(repository_id.to_string());
        state.items.insert(id, vec![item.clone()]);
        item
    }

    /// Current version of an item
    pub fn item(&self, id: &str) -> Option<ContentItem> {
        self.state().current(id).ok().cloned()
    }

    /// Current version of every item
    pub fn items(&self) -> Vec<ContentItem> {
        self.state()
            .items
            .values()
            .filter_map(|versions| versions.last().cloned())
            .collect()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state().folders.clone()
    }

    pub fn repository(&self, id: &str) -> Option<Repository> {
        self.state().repositories.iter().find(|r| r.id == id).cloned()
    }

    pub fn counters(&self) -> HubCounters {
        self.state().counters
    }

    /// Makes create/update calls fail for items with this label
    pub fn fail_label(&self, label: &str) {
        self.state().failing_labels.insert(label.to_string());
    }

    /// Makes publish jobs for items with this label end in FAILED
    pub fn fail_publish_label(&self, label: &str) {
        self.state().failing_publish_labels.insert(label.to_string());
    }

    /// Number of status polls before a publish job reaches a terminal state
    pub fn set_publish_polls(&self, polls: u32) {
        self.state().publish_polls = polls;
    }

    /// Highest number of publish jobs that were in flight at once
    pub fn max_active_publishes(&self) -> usize {
        self.state().max_active_publishes
    }
}

#[async_trait]
impl ContentService for MemoryHub {
    async fn list_repositories(&self) -> HubResult<Vec<Repository>> {
        Ok(self.state().repositories.clone())
    }

    async fn get_repository(&self, id: &str) -> HubResult<Repository> {
        self.repository(id)
            .ok_or_else(|| HubError::not_found("repository", id))
    }

    async fn list_folders(&self, repository_id: &str) -> HubResult<Vec<Folder>> {
        let state = self.state();
        if !state.repositories.iter().any(|r| r.id == repository_id) {
            return Err(HubError::not_found("repository", repository_id));
        }

        Ok(state
            .folders
            .iter()
            .filter(|f| f.repository_id.as_deref() == Some(repository_id) && f.parent_id.is_none())
            .cloned()
            .collect())
    }

    async fn list_subfolders(&self, folder_id: &str) -> HubResult<Vec<Folder>> {
        Ok(self
            .state()
            .folders
            .iter()
            .filter(|f| f.parent_id.as_deref() == Some(folder_id))
            .cloned()
            .collect())
    }

    async fn get_folder(&self, id: &str) -> HubResult<Folder> {
        self.state()
            .folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| HubError::not_found("folder", id))
    }

    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> HubResult<Folder> {
        let folder = self.add_folder(repository_id, parent_id, name);
        self.state().counters.folders_created += 1;
        Ok(folder)
    }

    async fn list_repository_items(
        &self,
        repository_id: &str,
        status: Option<ContentStatus>,
    ) -> HubResult<Vec<ContentItem>> {
        Ok(self
            .items()
            .into_iter()
            .filter(|item| item.content_repository_id.as_deref() == Some(repository_id))
            .filter(|item| status.map_or(true, |s| item.status == s))
            .collect())
    }

    async fn list_folder_items(&self, folder_id: &str) -> HubResult<Vec<ContentItem>> {
        Ok(self
            .items()
            .into_iter()
            .filter(|item| item.folder_id.as_deref() == Some(folder_id))
            .collect())
    }

    async fn get_content_item(&self, id: &str) -> HubResult<ContentItem> {
        self.state().current(id).cloned()
    }

    async fn create_content_item(
        &self,
        repository_id: &str,
        item: &ContentItem,
    ) -> HubResult<ContentItem> {
        let mut state = self.state();
        state.check_failure(&item.label)?;
        if !state.repositories.iter().any(|r| r.id == repository_id) {
            return Err(HubError::not_found("repository", repository_id));
        }

        let id = state.next_id("item");
        let created = ContentItem {
            id: Some(id.clone()),
            version: Some(1),
            status: ContentStatus::Active,
            content_repository_id: Some(repository_id.to_string()),
            last_published_version: None,
            ..item.clone()
        };

        state.items.insert(id, vec![created.clone()]);
        state.counters.creates += 1;
        Ok(created)
    }

    async fn update_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let mut state = self.state();
        state.check_failure(&item.label)?;

        let id = item.id_str().to_string();
        let current = state.current(&id)?;
        if item.version != current.version {
            return Err(HubError::Conflict(format!(
                "version {:?} of {} is stale (current {:?})",
                item.version, id, current.version
            )));
        }

        let next = ContentItem {
            status: current.status,
            last_published_version: current.last_published_version,
            ..item.clone()
        };
        let updated = state.push_version(&id, next)?;
        state.counters.updates += 1;
        Ok(updated)
    }

    async fn archive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let mut state = self.state();
        let id = item.id_str().to_string();
        let current = state.current(&id)?.clone();
        if current.status != ContentStatus::Active {
            return Err(HubError::Conflict(format!("{} is not active", id)));
        }

        let archived = state.push_version(
            &id,
            ContentItem {
                status: ContentStatus::Archived,
                ..current
            },
        )?;
        state.counters.archives += 1;
        Ok(archived)
    }

    async fn unarchive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let mut state = self.state();
        let id = item.id_str().to_string();
        let current = state.current(&id)?.clone();
        if current.status != ContentStatus::Archived {
            return Err(HubError::Conflict(format!("{} is not archived", id)));
        }

        let restored = state.push_version(
            &id,
            ContentItem {
                status: ContentStatus::Active,
                ..current
            },
        )?;
        state.counters.unarchives += 1;
        Ok(restored)
    }

    async fn content_item_version(&self, id: &str, version: u64) -> HubResult<ContentItem> {
        self.state()
            .items
            .get(id)
            .and_then(|versions| versions.iter().find(|v| v.version == Some(version)))
            .cloned()
            .ok_or_else(|| HubError::not_found("content item version", format!("{}@{}", id, version)))
    }

    async fn set_locale(&self, item: &ContentItem, locale: &str) -> HubResult<ContentItem> {
        let mut state = self.state();
        let id = item.id_str().to_string();
        let current = state.current(&id)?.clone();

        state.push_version(
            &id,
            ContentItem {
                locale: Some(locale.to_string()),
                ..current
            },
        )
    }

    async fn list_content_types(&self) -> HubResult<Vec<ContentType>> {
        Ok(self.state().content_types.clone())
    }

    async fn list_content_type_schemas(&self) -> HubResult<Vec<ContentTypeSchema>> {
        Ok(self.state().schemas.clone())
    }

    async fn register_content_type(
        &self,
        schema_uri: &str,
        label: &str,
    ) -> HubResult<ContentType> {
        let mut state = self.state();
        if !state.schemas.iter().any(|s| s.schema_id == schema_uri) {
            return Err(HubError::not_found("content type schema", schema_uri));
        }

        let content_type = ContentType {
            id: state.next_id("type"),
            content_type_uri: schema_uri.to_string(),
            settings: ContentTypeSettings {
                label: label.to_string(),
            },
        };
        state.content_types.push(content_type.clone());
        Ok(content_type)
    }

    async fn assign_content_type(
        &self,
        repository_id: &str,
        content_type_id: &str,
    ) -> HubResult<Repository> {
        let mut state = self.state();
        let content_type = state
            .content_types
            .iter()
            .find(|t| t.id == content_type_id)
            .cloned()
            .ok_or_else(|| HubError::not_found("content type", content_type_id))?;

        let repository = state
            .repositories
            .iter_mut()
            .find(|r| r.id == repository_id)
            .ok_or_else(|| HubError::not_found("repository", repository_id))?;

        if !repository.has_content_type(&content_type.content_type_uri) {
            repository.content_types.push(RepositoryContentType {
                hub_content_type_id: content_type.id,
                content_type_uri: content_type.content_type_uri,
            });
        }
        Ok(repository.clone())
    }
}

#[async_trait]
impl Publisher for MemoryHub {
    async fn start_publish(&self, item: &ContentItem) -> HubResult<String> {
        let mut state = self.state();
        let id = item.id_str().to_string();
        let current = state.current(&id)?;
        let fail = state.failing_publish_labels.contains(&current.label);

        let location = state.next_id("job");
        let polls_left = state.publish_polls;
        state.jobs.insert(
            location.clone(),
            PublishRecord {
                item_id: id,
                polls_left,
                fail,
                finished: false,
            },
        );

        state.counters.publishes += 1;
        state.active_publishes += 1;
        state.max_active_publishes = state.max_active_publishes.max(state.active_publishes);
        Ok(location)
    }

    async fn publish_job_state(&self, location: &str) -> HubResult<PublishJobState> {
        let mut state = self.state();
        let job = state
            .jobs
            .get_mut(location)
            .ok_or_else(|| HubError::not_found("publish job", location))?;

        if job.finished {
            return Ok(if job.fail {
                PublishJobState::Failed
            } else {
                PublishJobState::Completed
            });
        }

        job.polls_left = job.polls_left.saturating_sub(1);
        if job.polls_left > 0 {
            return Ok(PublishJobState::InProgress);
        }

        job.finished = true;
        let fail = job.fail;
        let item_id = job.item_id.clone();
        state.active_publishes = state.active_publishes.saturating_sub(1);

        if fail {
            return Ok(PublishJobState::Failed);
        }

        if let Some(current) = state.items.get_mut(&item_id).and_then(|v| v.last_mut()) {
            current.last_published_version = current.version;
        }
        Ok(PublishJobState::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_update_and_history() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");

        let created = hub
            .create_content_item(&repo.id, &ContentItem::new("A", json!({ "v": 1 })))
            .await
            .unwrap();
        assert_eq!(created.version, Some(1));

        let mut next = created.clone();
        next.body = json!({ "v": 2 });
        let updated = hub.update_content_item(&next).await.unwrap();
        assert_eq!(updated.version, Some(2));

        let old = hub
            .content_item_version(created.id_str(), 1)
            .await
            .unwrap();
        assert_eq!(old.body, json!({ "v": 1 }));
        assert_eq!(hub.counters().creates, 1);
        assert_eq!(hub.counters().updates, 1);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let item = hub.insert_item(&repo.id, ContentItem::new("A", json!({})));

        let mut stale = item.clone();
        stale.version = Some(7);
        assert!(matches!(
            hub.update_content_item(&stale).await,
            Err(HubError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn archive_round_trip() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let item = hub.insert_item(&repo.id, ContentItem::new("A", json!({})));

        let archived = hub.archive_content_item(&item).await.unwrap();
        assert_eq!(archived.status, ContentStatus::Archived);
        assert!(hub.archive_content_item(&archived).await.is_err());

        let active = hub
            .list_repository_items(&repo.id, Some(ContentStatus::Active))
            .await
            .unwrap();
        assert!(active.is_empty());

        let restored = hub.unarchive_content_item(&archived).await.unwrap();
        assert_eq!(restored.status, ContentStatus::Active);
    }

    #[tokio::test]
    async fn injected_failures() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        hub.fail_label("broken");

        let result = hub
            .create_content_item(&repo.id, &ContentItem::new("broken", json!({})))
            .await;
        assert!(matches!(result, Err(HubError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn publish_job_completes_after_polls() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let item = hub.insert_item(&repo.id, ContentItem::new("A", json!({})));
        hub.set_publish_polls(2);

        let job = hub.start_publish(&item).await.unwrap();
        assert_eq!(
            hub.publish_job_state(&job).await.unwrap(),
            PublishJobState::InProgress
        );
        assert_eq!(
            hub.publish_job_state(&job).await.unwrap(),
            PublishJobState::Completed
        );
        assert_eq!(
            hub.item(item.id_str()).unwrap().last_published_version,
            Some(1)
        );
    }

    #[tokio::test]
    async fn folders_and_content_types() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let root = hub.add_folder(&repo.id, None, "Blog");
        hub.add_folder(&repo.id, Some(root.id.as_str()), "2024");

        assert_eq!(hub.list_folders(&repo.id).await.unwrap().len(), 1);
        assert_eq!(hub.list_subfolders(&root.id).await.unwrap()[0].name, "2024");

        assert!(hub.register_content_type("missing", "x").await.is_err());
        hub.add_schema("https://example.com/banner", &json!({}));
        let content_type = hub
            .register_content_type("https://example.com/banner", "Banner")
            .await
            .unwrap();
        let repo = hub
            .assign_content_type(&repo.id, &content_type.id)
            .await
            .unwrap();
        assert!(repo.has_content_type("https://example.com/banner"));
    }
}
