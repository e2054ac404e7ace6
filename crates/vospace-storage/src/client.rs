//! Raw object-store API
//!
//! [`ObjectClient`] is the thin, Swift-shaped surface a remote object store
//! has to offer. All tree-level semantics (paging, chunk cleanup, not-found
//! absorption) live in [`crate::ObjectStorage`], once, on top of it.

use crate::{ByteStream, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Account-wide usage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub container_count: u64,
    pub object_count: u64,
    pub bytes_used: u64,
}

/// Aggregate information about one container
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub object_count: u64,
    pub bytes_used: u64,
    /// Replication target configured on the container
    pub sync_to: Option<String>,
}

/// Object metadata returned by a HEAD request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: u64,
    pub content_type: String,
    /// `container/prefix` of the segments when the object is a chunked manifest
    pub manifest: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One row of a container listing
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Listing parameters; results are ordered by name and start after `marker`
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub limit: usize,
}

impl ListQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.marker = marker;
        self
    }
}

/// Object store operations used by [`crate::ObjectStorage`].
///
/// Missing containers or objects are reported as
/// [`crate::StorageError::NotFound`] unless the signature returns an `Option`.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Account usage
    async fn account_info(&self) -> Result<AccountInfo>;

    /// Container aggregate, `None` if the container does not exist
    async fn container_info(&self, container: &str) -> Result<Option<ContainerInfo>>;

    async fn create_container(&self, container: &str) -> Result<()>;

    async fn delete_container(&self, container: &str) -> Result<()>;

    /// Configure replication of a container to an external endpoint
    async fn set_container_sync(&self, container: &str, sync_to: &str, key: &str) -> Result<()>;

    /// One page of objects, ordered by name
    async fn list_objects(&self, container: &str, query: &ListQuery) -> Result<Vec<ObjectEntry>>;

    /// Object metadata, `None` if the object does not exist
    async fn head_object(&self, container: &str, name: &str) -> Result<Option<ObjectMeta>>;

    /// Object content, `None` if the object does not exist
    async fn get_object(&self, container: &str, name: &str) -> Result<Option<ByteStream>>;

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        data: ByteStream,
        content_type: &str,
    ) -> Result<()>;

    /// Write an empty object whose content is the concatenation of all
    /// objects under `manifest` (`container/prefix`)
    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: &str,
        content_type: &str,
    ) -> Result<()>;

    /// Server-side copy; manifests are materialized into a plain object
    async fn copy_object(
        &self,
        src_container: &str,
        src_name: &str,
        dst_container: &str,
        dst_name: &str,
    ) -> Result<()>;

    async fn delete_object(&self, container: &str, name: &str) -> Result<()>;

    /// Base URL of the storage account
    fn storage_url(&self) -> &str;
}
