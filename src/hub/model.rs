//! Hub resources other than content items

use serde::{Deserialize, Serialize};

/// A content type assigned to a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryContentType {
    pub hub_content_type_id: String,
    pub content_type_uri: String,
}

/// A content repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub content_types: Vec<RepositoryContentType>,
}

impl Repository {
    /// Returns true if a content type with this schema URI is assigned
    pub fn has_content_type(&self, schema_uri: &str) -> bool {
        self.content_types
            .iter()
            .any(|t| t.content_type_uri == schema_uri)
    }
}

/// A folder inside a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub repository_id: Option<String>,
    /// Parent folder, `None` for folders at the repository root
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentTypeSettings {
    #[serde(default)]
    pub label: String,
}

/// A registered content type (schema URI + display settings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub id: String,
    pub content_type_uri: String,
    #[serde(default)]
    pub settings: ContentTypeSettings,
}

/// A content type schema document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeSchema {
    pub id: String,
    pub schema_id: String,
    /// Raw JSON schema text
    #[serde(default)]
    pub body: String,
}

/// State of an asynchronous publish job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishJobState {
    Preparing,
    InProgress,
    Completed,
    Failed,
}

impl PublishJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishJobState::Completed | PublishJobState::Failed)
    }
}
