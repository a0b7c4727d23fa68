//! Folder structure replication
//!
//! Each directory under an import base maps to a folder of the same name
//! under the folder its parent directory maps to, created when missing.
//! Resolutions are cached per relative path; concurrent requests for the
//! same path share one in-flight resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::OnceCell;
use tracing::info;

use crate::hub::{ContentService, Folder, HubResult, Repository};

type FolderCell = Arc<OnceCell<Option<Folder>>>;

/// Maps directories relative to an import base onto hub folders
pub struct FolderResolver<'a> {
    service: &'a dyn ContentService,
    repository: Repository,
    root_folders: Vec<Folder>,
    paths: Mutex<HashMap<PathBuf, FolderCell>>,
    subfolders: Mutex<HashMap<String, Vec<Folder>>>,
    notes: Mutex<Vec<String>>,
}

impl<'a> FolderResolver<'a> {
    /// Creates a resolver whose base directory maps to `base_folder`, or to
    /// the repository root when `None`
    pub async fn new(
        service: &'a dyn ContentService,
        repository: Repository,
        base_folder: Option<Folder>,
    ) -> HubResult<FolderResolver<'a>> {
        let root_folders = service.list_folders(&repository.id).await?;

        let mut paths = HashMap::new();
        paths.insert(
            PathBuf::new(),
            Arc::new(OnceCell::new_with(Some(base_folder))),
        );

        Ok(Self {
            service,
            repository,
            root_folders,
            paths: Mutex::new(paths),
            subfolders: Mutex::new(HashMap::new()),
            notes: Mutex::new(Vec::new()),
        })
    }

    /// Resolves (creating as needed) the folder for a relative directory
    ///
    /// Returns `None` for the repository root.
    pub fn resolve<'s>(&'s self, relative: &Path) -> BoxFuture<'s, HubResult<Option<Folder>>> {
        let relative = normalize(relative);

        async move {
            let cell = self.cell(&relative);
            let folder = cell
                .get_or_try_init(|| self.get_or_create(relative.clone()))
                .await?;
            Ok(folder.clone())
        }
        .boxed()
    }

    /// Progress notes gathered so far, for the run log
    pub fn take_notes(&self) -> Vec<String> {
        self.notes
            .lock()
            .map(|mut notes| std::mem::take(&mut *notes))
            .unwrap_or_default()
    }

    fn cell(&self, relative: &Path) -> FolderCell {
        let mut paths = self.paths.lock().unwrap_or_else(|p| p.into_inner());
        paths
            .entry(relative.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn note(&self, text: String) {
        info!("{}", text);
        if let Ok(mut notes) = self.notes.lock() {
            notes.push(text);
        }
    }

    async fn get_or_create(&self, relative: PathBuf) -> HubResult<Option<Folder>> {
        let parent_path = relative.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let parent = self.resolve(&parent_path).await?;
        let container = match &parent {
            Some(parent) => self.subfolders_of(parent).await?,
            None => self.root_folders.clone(),
        };
        let container_name = parent
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| self.repository.label.clone());

        if let Some(existing) = container.into_iter().find(|f| f.name == name) {
            self.note(format!(
                "Found existing subfolder in {}: '{}'.",
                container_name,
                relative.display()
            ));
            return Ok(Some(existing));
        }

        let created = self
            .service
            .create_folder(&self.repository.id, parent.as_ref().map(|p| p.id.as_str()), &name)
            .await?;

        if let Some(parent) = &parent {
            let mut subfolders = self.subfolders.lock().unwrap_or_else(|p| p.into_inner());
            subfolders
                .entry(parent.id.clone())
                .or_default()
                .push(created.clone());
        }

        self.note(format!(
            "Created folder in {}: '{}'.",
            container_name,
            relative.display()
        ));
        Ok(Some(created))
    }

    async fn subfolders_of(&self, folder: &Folder) -> HubResult<Vec<Folder>> {
        let cached = self
            .subfolders
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&folder.id)
            .cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let listed = self.service.list_subfolders(&folder.id).await?;
        let mut subfolders = self.subfolders.lock().unwrap_or_else(|p| p.into_inner());
        Ok(subfolders
            .entry(folder.id.clone())
            .or_insert(listed)
            .clone())
    }
}

/// Drops `.` components so `./a/b` and `a/b` share a cache entry
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::MemoryHub;
    use futures::future::join_all;

    #[tokio::test]
    async fn creates_missing_structure_once() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        hub.add_folder(&repo.id, None, "blog");

        let resolver = FolderResolver::new(&hub, repo.clone(), None).await.unwrap();

        let paths = [
            PathBuf::from("blog/2024"),
            PathBuf::from("blog/2024/"),
            PathBuf::from("./blog/2024"),
            PathBuf::from("blog"),
            PathBuf::from("news"),
        ];
        let results = join_all(paths.iter().map(|p| resolver.resolve(p))).await;
        let folders: Vec<Folder> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(folders[0], folders[1]);
        assert_eq!(folders[0], folders[2]);
        assert_eq!(folders[3].name, "blog");
        assert_eq!(folders[0].parent_id.as_deref(), Some(folders[3].id.as_str()));

        // "2024" and "news" are new, "blog" already existed
        assert_eq!(hub.counters().folders_created, 2);
        assert_eq!(resolver.take_notes().len(), 3);
    }

    #[tokio::test]
    async fn base_directory_maps_to_base_folder() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let base = hub.add_folder(&repo.id, None, "import-here");

        let resolver = FolderResolver::new(&hub, repo, Some(base.clone()))
            .await
            .unwrap();

        assert_eq!(resolver.resolve(Path::new("")).await.unwrap(), Some(base.clone()));
        let child = resolver.resolve(Path::new("child")).await.unwrap().unwrap();
        assert_eq!(child.parent_id, Some(base.id));
    }

    #[tokio::test]
    async fn repository_root_is_none() {
        let hub = MemoryHub::new();
        let repo = hub.add_repository("content", "Content");
        let resolver = FolderResolver::new(&hub, repo, None).await.unwrap();

        assert_eq!(resolver.resolve(Path::new(".")).await.unwrap(), None);
    }
}
