//! Catalog repository: content records, data resources, and associations.
//!
//! The repository is an external collaborator. Everything in this crate talks
//! to it through the [`Repository`] trait, injected by the caller, so the
//! pipeline never reaches for a global dispatcher.
//!
//! # Record model
//!
//! ```text
//! Product ──ProductContent(status)──▶ Content ──▶ DataResource
//!                                       │           (object_info = URL,
//!                                       │            name = filename, mime)
//!                                       └─IMAGE_THUMBNAIL(map_key)──▶ Content ──▶ DataResource
//! ```
//!
//! Each stored file has exactly one data resource and one content record.
//!
//! # FileRepository
//!
//! [`FileRepository`] is a small self-contained implementation used by the
//! CLI and the test suite. It keeps every record in memory and, when opened
//! with a path, writes the whole catalog back as pretty JSON after each
//! mutation (same shape of persistence as a manifest file).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("repository storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Association type linking a parent image to its thumbnails and sized copies.
pub const IMAGE_THUMBNAIL: &str = "IMAGE_THUMBNAIL";

/// Data resource type for stored image files.
pub const IMAGE_OBJECT: &str = "IMAGE_OBJECT";

/// Content type given to every image content record.
pub const DOCUMENT: &str = "DOCUMENT";

/// Approval status of a product image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    #[serde(rename = "IM_PENDING")]
    Pending,
    #[serde(rename = "IM_APPROVED")]
    Approved,
}

/// Location and identity of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Public URL of the file.
    pub url: String,
    /// Filename inside the owner directory.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_resource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResourceRecord {
    pub data_resource_id: String,
    pub object_info: String,
    pub name: String,
    pub type_id: String,
    pub mime_type: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAssociation {
    pub from_id: String,
    pub to_id: String,
    pub assoc_type: String,
    pub map_key: String,
}

/// Link between an owner (product) and one of its image contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContent {
    pub product_id: String,
    pub content_id: String,
    pub product_content_type: String,
    pub status: ImageStatus,
}

/// Synchronous request/response operations on the catalog.
///
/// No call is retried; an error surfaces immediately to the caller.
pub trait Repository {
    /// Create an empty content record and return its id.
    fn create_content(&self) -> Result<String, RepositoryError>;

    /// Create a data resource for a stored file and return its id.
    fn create_data_resource(
        &self,
        object_info: &ObjectInfo,
        type_id: &str,
        mime_type: &str,
        is_public: bool,
    ) -> Result<String, RepositoryError>;

    /// Point a content record at a data resource and set its display name.
    /// `data_resource_id = None` only renames the content.
    fn update_content(
        &self,
        content_id: &str,
        data_resource_id: Option<&str>,
        name: &str,
    ) -> Result<(), RepositoryError>;

    fn update_data_resource(
        &self,
        data_resource_id: &str,
        object_info: &ObjectInfo,
    ) -> Result<(), RepositoryError>;

    fn create_content_association(
        &self,
        from_id: &str,
        to_id: &str,
        assoc_type: &str,
        map_key: &str,
    ) -> Result<(), RepositoryError>;

    fn query_content_by_id(&self, content_id: &str)
    -> Result<Option<ContentRecord>, RepositoryError>;

    fn query_data_resource(
        &self,
        data_resource_id: &str,
    ) -> Result<Option<DataResourceRecord>, RepositoryError>;

    fn query_associations_by_type_and_parent(
        &self,
        assoc_type: &str,
        parent_id: &str,
    ) -> Result<Vec<ContentAssociation>, RepositoryError>;

    /// File extensions registered for a mime type, in registration order.
    fn query_file_extensions_by_mime_type(
        &self,
        mime_type: &str,
    ) -> Result<Vec<String>, RepositoryError>;

    /// Attach a content to its owner with the given status.
    fn create_owner_content(&self, link: &OwnerContent) -> Result<(), RepositoryError>;

    fn query_owner_content(
        &self,
        product_id: &str,
        content_id: &str,
    ) -> Result<Option<OwnerContent>, RepositoryError>;

    /// Open an approval entry for a newly uploaded image.
    fn create_image_approval(&self, content_id: &str) -> Result<(), RepositoryError>;

    fn update_image_status(
        &self,
        content_id: &str,
        status: ImageStatus,
    ) -> Result<(), RepositoryError>;
}

/// Data resource of a content record, if it has one.
pub fn data_resource_for_content(
    repo: &dyn Repository,
    content_id: &str,
) -> Result<Option<DataResourceRecord>, RepositoryError> {
    let Some(content) = repo.query_content_by_id(content_id)? else {
        return Ok(None);
    };
    match content.data_resource_id {
        Some(id) => repo.query_data_resource(&id),
        None => Ok(None),
    }
}

/// Register a stored file: create its data resource, point the content at it,
/// then refresh the data resource through the content's link.
///
/// Returns the data resource id.
pub fn create_content_and_data_resource(
    repo: &dyn Repository,
    content_id: &str,
    object_info: &ObjectInfo,
    mime_type: &str,
) -> Result<String, RepositoryError> {
    let data_resource_id = repo.create_data_resource(object_info, IMAGE_OBJECT, mime_type, true)?;
    repo.update_content(content_id, Some(&data_resource_id), &object_info.name)?;
    if let Some(linked) = data_resource_for_content(repo, content_id)? {
        repo.update_data_resource(&linked.data_resource_id, object_info)?;
    }
    Ok(data_resource_id)
}

// ============================================================================
// FileRepository
// ============================================================================

/// Extensions registered by default, first entry wins per mime type.
const DEFAULT_FILE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpeg", "jpeg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/tiff", "tiff"),
    ("image/webp", "webp"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Catalog {
    next_id: u64,
    contents: BTreeMap<String, ContentRecord>,
    data_resources: BTreeMap<String, DataResourceRecord>,
    associations: Vec<ContentAssociation>,
    owner_contents: Vec<OwnerContent>,
    approvals: Vec<String>,
    file_extensions: Vec<(String, String)>,
}

impl Catalog {
    fn seeded() -> Self {
        Self {
            next_id: 10000,
            file_extensions: DEFAULT_FILE_EXTENSIONS
                .iter()
                .map(|(mime, ext)| (mime.to_string(), ext.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

/// In-memory catalog, optionally persisted to a JSON file.
#[derive(Debug)]
pub struct FileRepository {
    path: Option<PathBuf>,
    catalog: Mutex<Catalog>,
}

impl FileRepository {
    /// A catalog that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            catalog: Mutex::new(Catalog::seeded()),
        }
    }

    /// Open (or start) a catalog persisted at `path`.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let catalog = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Catalog::seeded()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            catalog: Mutex::new(catalog),
        })
    }

    /// Register an extra extension for a mime type (appended, so lower priority).
    pub fn register_file_extension(&self, mime_type: &str, extension: &str) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            c.file_extensions
                .push((mime_type.to_string(), extension.to_string()));
            Ok(())
        })
    }

    /// Number of content records, for tests and summaries.
    pub fn content_count(&self) -> usize {
        self.read(|c| c.contents.len())
    }

    /// Every owner link, in creation order.
    pub fn owner_contents(&self) -> Vec<OwnerContent> {
        self.read(|c| c.owner_contents.clone())
    }

    /// Content ids with an open approval entry.
    pub fn approvals(&self) -> Vec<String> {
        self.read(|c| c.approvals.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&Catalog) -> T) -> T {
        let guard = self
            .catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Catalog) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut guard = self
            .catalog
            .lock()
            .map_err(|_| RepositoryError::Storage("catalog lock poisoned".into()))?;
        let value = f(&mut guard)?;
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&*guard)?;
            std::fs::write(path, json)?;
        }
        Ok(value)
    }
}

fn not_found(kind: &'static str, id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        kind,
        id: id.to_string(),
    }
}

impl Repository for FileRepository {
    fn create_content(&self) -> Result<String, RepositoryError> {
        self.mutate(|c| {
            let content_id = c.next_id();
            c.contents.insert(
                content_id.clone(),
                ContentRecord {
                    content_id: content_id.clone(),
                    content_type: DOCUMENT.to_string(),
                    name: None,
                    data_resource_id: None,
                },
            );
            Ok(content_id)
        })
    }

    fn create_data_resource(
        &self,
        object_info: &ObjectInfo,
        type_id: &str,
        mime_type: &str,
        is_public: bool,
    ) -> Result<String, RepositoryError> {
        self.mutate(|c| {
            let data_resource_id = c.next_id();
            c.data_resources.insert(
                data_resource_id.clone(),
                DataResourceRecord {
                    data_resource_id: data_resource_id.clone(),
                    object_info: object_info.url.clone(),
                    name: object_info.name.clone(),
                    type_id: type_id.to_string(),
                    mime_type: mime_type.to_string(),
                    is_public,
                },
            );
            Ok(data_resource_id)
        })
    }

    fn update_content(
        &self,
        content_id: &str,
        data_resource_id: Option<&str>,
        name: &str,
    ) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            if let Some(id) = data_resource_id
                && !c.data_resources.contains_key(id)
            {
                return Err(not_found("data resource", id));
            }
            let content = c
                .contents
                .get_mut(content_id)
                .ok_or_else(|| not_found("content", content_id))?;
            content.name = Some(name.to_string());
            if let Some(id) = data_resource_id {
                content.data_resource_id = Some(id.to_string());
            }
            Ok(())
        })
    }

    fn update_data_resource(
        &self,
        data_resource_id: &str,
        object_info: &ObjectInfo,
    ) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            let resource = c
                .data_resources
                .get_mut(data_resource_id)
                .ok_or_else(|| not_found("data resource", data_resource_id))?;
            resource.object_info = object_info.url.clone();
            resource.name = object_info.name.clone();
            Ok(())
        })
    }

    fn create_content_association(
        &self,
        from_id: &str,
        to_id: &str,
        assoc_type: &str,
        map_key: &str,
    ) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            for id in [from_id, to_id] {
                if !c.contents.contains_key(id) {
                    return Err(not_found("content", id));
                }
            }
            c.associations.push(ContentAssociation {
                from_id: from_id.to_string(),
                to_id: to_id.to_string(),
                assoc_type: assoc_type.to_string(),
                map_key: map_key.to_string(),
            });
            Ok(())
        })
    }

    fn query_content_by_id(
        &self,
        content_id: &str,
    ) -> Result<Option<ContentRecord>, RepositoryError> {
        Ok(self.read(|c| c.contents.get(content_id).cloned()))
    }

    fn query_data_resource(
        &self,
        data_resource_id: &str,
    ) -> Result<Option<DataResourceRecord>, RepositoryError> {
        Ok(self.read(|c| c.data_resources.get(data_resource_id).cloned()))
    }

    fn query_associations_by_type_and_parent(
        &self,
        assoc_type: &str,
        parent_id: &str,
    ) -> Result<Vec<ContentAssociation>, RepositoryError> {
        Ok(self.read(|c| {
            c.associations
                .iter()
                .filter(|a| a.assoc_type == assoc_type && a.from_id == parent_id)
                .cloned()
                .collect()
        }))
    }

    fn query_file_extensions_by_mime_type(
        &self,
        mime_type: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        Ok(self.read(|c| {
            c.file_extensions
                .iter()
                .filter(|(mime, _)| mime == mime_type)
                .map(|(_, ext)| ext.clone())
                .collect()
        }))
    }

    fn create_owner_content(&self, link: &OwnerContent) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            if !c.contents.contains_key(&link.content_id) {
                return Err(not_found("content", &link.content_id));
            }
            c.owner_contents.push(link.clone());
            Ok(())
        })
    }

    fn query_owner_content(
        &self,
        product_id: &str,
        content_id: &str,
    ) -> Result<Option<OwnerContent>, RepositoryError> {
        Ok(self.read(|c| {
            c.owner_contents
                .iter()
                .find(|o| o.product_id == product_id && o.content_id == content_id)
                .cloned()
        }))
    }

    fn create_image_approval(&self, content_id: &str) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            c.approvals.push(content_id.to_string());
            Ok(())
        })
    }

    fn update_image_status(
        &self,
        content_id: &str,
        status: ImageStatus,
    ) -> Result<(), RepositoryError> {
        self.mutate(|c| {
            let mut found = false;
            for link in c
                .owner_contents
                .iter_mut()
                .filter(|o| o.content_id == content_id)
            {
                link.status = status;
                found = true;
            }
            if found {
                Ok(())
            } else {
                Err(not_found("product content", content_id))
            }
        })
    }
}
