//! Content service traits
//!
//! Orchestrators only talk to a hub through these traits, so the same
//! import/export logic runs against the HTTP API or the in-memory hub.

use async_trait::async_trait;
use thiserror::Error;

use super::model::{ContentType, ContentTypeSchema, Folder, PublishJobState, Repository};
use crate::domain::{ContentItem, ContentStatus};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Hub returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl HubError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        HubError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::NotFound { .. })
    }
}

pub type HubResult<T> = std::result::Result<T, HubError>;

/// Content management operations on one hub
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Lists every repository in the hub
    async fn list_repositories(&self) -> HubResult<Vec<Repository>>;

    async fn get_repository(&self, id: &str) -> HubResult<Repository>;

    /// Lists the folders at the root of a repository
    async fn list_folders(&self, repository_id: &str) -> HubResult<Vec<Folder>>;

    /// Lists the direct subfolders of a folder
    async fn list_subfolders(&self, folder_id: &str) -> HubResult<Vec<Folder>>;

    async fn get_folder(&self, id: &str) -> HubResult<Folder>;

    /// Creates a folder under `parent_id`, or at the repository root
    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> HubResult<Folder>;

    /// Lists the items of a repository, optionally by status
    async fn list_repository_items(
        &self,
        repository_id: &str,
        status: Option<ContentStatus>,
    ) -> HubResult<Vec<ContentItem>>;

    /// Lists the items directly inside a folder
    async fn list_folder_items(&self, folder_id: &str) -> HubResult<Vec<ContentItem>>;

    async fn get_content_item(&self, id: &str) -> HubResult<ContentItem>;

    /// Creates an item in a repository; `item.folder_id` places it in a folder
    async fn create_content_item(
        &self,
        repository_id: &str,
        item: &ContentItem,
    ) -> HubResult<ContentItem>;

    /// Updates an item; `item.id` and `item.version` must match the hub
    async fn update_content_item(&self, item: &ContentItem) -> HubResult<ContentItem>;

    async fn archive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem>;

    async fn unarchive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem>;

    /// Fetches a historical version of an item
    async fn content_item_version(&self, id: &str, version: u64) -> HubResult<ContentItem>;

    async fn set_locale(&self, item: &ContentItem, locale: &str) -> HubResult<ContentItem>;

    async fn list_content_types(&self) -> HubResult<Vec<ContentType>>;

    async fn list_content_type_schemas(&self) -> HubResult<Vec<ContentTypeSchema>>;

    /// Registers a content type for an existing schema
    async fn register_content_type(&self, schema_uri: &str, label: &str)
        -> HubResult<ContentType>;

    /// Assigns a registered content type to a repository
    async fn assign_content_type(
        &self,
        repository_id: &str,
        content_type_id: &str,
    ) -> HubResult<Repository>;
}

/// Asynchronous publishing
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Starts publishing an item's current version; returns the job location
    async fn start_publish(&self, item: &ContentItem) -> HubResult<String>;

    async fn publish_job_state(&self, location: &str) -> HubResult<PublishJobState>;
}
