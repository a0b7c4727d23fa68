//! HTTP content service
//!
//! Talks to the hub's management API with a bearer token. Listings are
//! HAL-style pages:
//!
//! ```json
//! { "_embedded": { "<rel>": [ ... ] }, "page": { "number": 0, "totalPages": 3 } }
//! ```

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::model::{ContentType, ContentTypeSchema, Folder, PublishJobState, Repository};
use super::service::{ContentService, HubError, HubResult, Publisher};
use crate::domain::{ContentItem, ContentStatus};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default, rename = "_embedded")]
    embedded: Map<String, Value>,
    page: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    state: PublishJobState,
}

/// Content service over the hub's HTTP API
pub struct HttpHub {
    client: reqwest::Client,
    base_url: String,
    hub_id: String,
    token: Option<String>,
}

impl HttpHub {
    pub fn new(base_url: &str, hub_id: &str, token: Option<String>) -> HubResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| HubError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            hub_id: hub_id.to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, kind: &'static str, id: &str) -> HubResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => HubError::not_found(kind, id),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HubError::Unauthorized(message),
            StatusCode::CONFLICT => HubError::Conflict(message),
            _ => HubError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        kind: &'static str,
        id: &str,
    ) -> HubResult<T> {
        self.send(builder, kind, id)
            .await?
            .json::<T>()
            .await
            .map_err(|e| HubError::Transport(format!("Invalid {} response: {e}", kind)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, kind: &'static str, id: &str) -> HubResult<T> {
        self.json(self.request(Method::GET, path), kind, id).await
    }

    /// Fetches every page of a listing
    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        rel: &str,
        query: &[(&str, String)],
        kind: &'static str,
        id: &str,
    ) -> HubResult<Vec<T>> {
        let mut out = Vec::new();
        let mut page_number = 0;

        loop {
            let mut params: Vec<(&str, String)> = query.to_vec();
            params.push(("page", page_number.to_string()));
            params.push(("size", PAGE_SIZE.to_string()));

            let page: Page = self
                .json(self.request(Method::GET, path).query(&params), kind, id)
                .await?;

            if let Some(values) = page.embedded.get(rel).and_then(Value::as_array) {
                for value in values {
                    let resource = serde_json::from_value(value.clone()).map_err(|e| {
                        HubError::Transport(format!("Invalid {} in listing: {e}", kind))
                    })?;
                    out.push(resource);
                }
            }

            page_number += 1;
            let total_pages = page.page.map(|p| p.total_pages).unwrap_or(0);
            if page_number >= total_pages {
                break;
            }
        }

        debug!("Listed {} {}(s) from {}", out.len(), kind, path);
        Ok(out)
    }
}

#[async_trait]
impl ContentService for HttpHub {
    async fn list_repositories(&self) -> HubResult<Vec<Repository>> {
        let path = format!("/hubs/{}/content-repositories", self.hub_id);
        self.list(&path, "content-repositories", &[], "hub", &self.hub_id)
            .await
    }

    async fn get_repository(&self, id: &str) -> HubResult<Repository> {
        self.get(&format!("/content-repositories/{}", id), "repository", id)
            .await
    }

    async fn list_folders(&self, repository_id: &str) -> HubResult<Vec<Folder>> {
        let path = format!("/content-repositories/{}/folders", repository_id);
        let folders: Vec<Folder> = self
            .list(&path, "folders", &[], "repository", repository_id)
            .await?;

        Ok(folders
            .into_iter()
            .map(|f| Folder {
                repository_id: Some(repository_id.to_string()),
                ..f
            })
            .collect())
    }

    async fn list_subfolders(&self, folder_id: &str) -> HubResult<Vec<Folder>> {
        let path = format!("/folders/{}/folders", folder_id);
        let folders: Vec<Folder> = self.list(&path, "folders", &[], "folder", folder_id).await?;

        Ok(folders
            .into_iter()
            .map(|f| Folder {
                parent_id: Some(folder_id.to_string()),
                ..f
            })
            .collect())
    }

    async fn get_folder(&self, id: &str) -> HubResult<Folder> {
        self.get(&format!("/folders/{}", id), "folder", id).await
    }

    async fn create_folder(
        &self,
        repository_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> HubResult<Folder> {
        let path = match parent_id {
            Some(parent) => format!("/folders/{}/folders", parent),
            None => format!("/content-repositories/{}/folders", repository_id),
        };

        let folder: Folder = self
            .json(
                self.request(Method::POST, &path).json(&json!({ "name": name })),
                "folder",
                parent_id.unwrap_or(repository_id),
            )
            .await?;

        Ok(Folder {
            repository_id: Some(repository_id.to_string()),
            parent_id: parent_id.map(str::to_string),
            ..folder
        })
    }

    async fn list_repository_items(
        &self,
        repository_id: &str,
        status: Option<ContentStatus>,
    ) -> HubResult<Vec<ContentItem>> {
        let path = format!("/content-repositories/{}/content-items", repository_id);
        let query: Vec<(&str, String)> = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();

        self.list(&path, "content-items", &query, "repository", repository_id)
            .await
    }

    async fn list_folder_items(&self, folder_id: &str) -> HubResult<Vec<ContentItem>> {
        let path = format!("/folders/{}/content-items", folder_id);
        self.list(&path, "content-items", &[], "folder", folder_id)
            .await
    }

    async fn get_content_item(&self, id: &str) -> HubResult<ContentItem> {
        self.get(&format!("/content-items/{}", id), "content item", id)
            .await
    }

    async fn create_content_item(
        &self,
        repository_id: &str,
        item: &ContentItem,
    ) -> HubResult<ContentItem> {
        let path = format!("/content-repositories/{}/content-items", repository_id);
        self.json(
            self.request(Method::POST, &path).json(item),
            "repository",
            repository_id,
        )
        .await
    }

    async fn update_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let id = item.id_str();
        self.json(
            self.request(Method::PATCH, &format!("/content-items/{}", id))
                .json(item),
            "content item",
            id,
        )
        .await
    }

    async fn archive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let id = item.id_str();
        self.json(
            self.request(Method::POST, &format!("/content-items/{}/archive", id))
                .json(&json!({ "version": item.version })),
            "content item",
            id,
        )
        .await
    }

    async fn unarchive_content_item(&self, item: &ContentItem) -> HubResult<ContentItem> {
        let id = item.id_str();
        self.json(
            self.request(Method::POST, &format!("/content-items/{}/unarchive", id))
                .json(&json!({ "version": item.version })),
            "content item",
            id,
        )
        .await
    }

    async fn content_item_version(&self, id: &str, version: u64) -> HubResult<ContentItem> {
        self.get(
            &format!("/content-items/{}/versions/{}", id, version),
            "content item version",
            id,
        )
        .await
    }

    async fn set_locale(&self, item: &ContentItem, locale: &str) -> HubResult<ContentItem> {
        let id = item.id_str();
        self.json(
            self.request(Method::PUT, &format!("/content-items/{}/locale", id))
                .json(&json!({ "locale": locale, "version": item.version })),
            "content item",
            id,
        )
        .await
    }

    async fn list_content_types(&self) -> HubResult<Vec<ContentType>> {
        let path = format!("/hubs/{}/content-types", self.hub_id);
        self.list(&path, "content-types", &[], "hub", &self.hub_id)
            .await
    }

    async fn list_content_type_schemas(&self) -> HubResult<Vec<ContentTypeSchema>> {
        let path = format!("/hubs/{}/content-type-schemas", self.hub_id);
        self.list(&path, "content-type-schemas", &[], "hub", &self.hub_id)
            .await
    }

    async fn register_content_type(
        &self,
        schema_uri: &str,
        label: &str,
    ) -> HubResult<ContentType> {
        let path = format!("/hubs/{}/content-types", self.hub_id);
        let body = json!({ "contentTypeUri": schema_uri, "settings": { "label": label } });

        self.json(
            self.request(Method::POST, &path).json(&body),
            "content type schema",
            schema_uri,
        )
        .await
    }

    async fn assign_content_type(
        &self,
        repository_id: &str,
        content_type_id: &str,
    ) -> HubResult<Repository> {
        let path = format!(
            "/content-repositories/{}/content-types/{}",
            repository_id, content_type_id
        );
        self.json(self.request(Method::POST, &path), "repository", repository_id)
            .await
    }
}

#[async_trait]
impl Publisher for HttpHub {
    async fn start_publish(&self, item: &ContentItem) -> HubResult<String> {
        let id = item.id_str();
        let response = self
            .send(
                self.request(Method::POST, &format!("/content-items/{}/publish", id)),
                "content item",
                id,
            )
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(HubError::Api {
                status: response.status().as_u16(),
                message: format!("Publish of {} returned no job", id),
            });
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| HubError::Api {
                status: StatusCode::NO_CONTENT.as_u16(),
                message: format!("Publish of {} returned no job location", id),
            })
    }

    async fn publish_job_state(&self, location: &str) -> HubResult<PublishJobState> {
        let status: JobStatus = self.get(location, "publish job", location).await?;
        Ok(status.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_base_and_keep_absolute_locations() {
        let hub = HttpHub::new("https://api.example.com/v2/content/", "hub-1", None).unwrap();

        assert_eq!(
            hub.url("/content-items/abc"),
            "https://api.example.com/v2/content/content-items/abc"
        );
        assert_eq!(
            hub.url("https://jobs.example.com/job/1"),
            "https://jobs.example.com/job/1"
        );
    }

    #[test]
    fn parses_hal_page() {
        let page: Page = serde_json::from_value(serde_json::json!({
            "_embedded": { "folders": [ { "id": "f1", "name": "Blog" } ] },
            "page": { "size": 100, "totalElements": 1, "totalPages": 1, "number": 0 }
        }))
        .unwrap();

        assert_eq!(page.page.unwrap().total_pages, 1);
        let folders: Vec<Folder> =
            serde_json::from_value(page.embedded["folders"].clone()).unwrap();
        assert_eq!(folders[0].name, "Blog");
    }
}
