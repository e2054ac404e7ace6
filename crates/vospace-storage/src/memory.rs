//! In-memory object client for testing and development

use crate::client::{AccountInfo, ContainerInfo, ListQuery, ObjectClient, ObjectEntry, ObjectMeta};
use crate::{bytes_stream, collect_bytes, ByteStream, Result, StorageError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    manifest: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl MemoryObject {
    fn new(data: Bytes, content_type: &str, manifest: Option<String>) -> Self {
        Self {
            etag: md5_hex(&data),
            data,
            content_type: content_type.to_string(),
            manifest,
            last_modified: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryContainer {
    objects: BTreeMap<String, MemoryObject>,
    sync_to: Option<String>,
    sync_key: Option<String>,
}

type Containers = BTreeMap<String, MemoryContainer>;

/// An in-memory object store with Swift semantics
#[derive(Clone, Default)]
pub struct MemoryObjectClient {
    containers: Arc<RwLock<Containers>>,
    list_calls: Arc<AtomicUsize>,
}

impl MemoryObjectClient {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all containers
    pub fn container_names(&self) -> Vec<String> {
        self.containers.read().keys().cloned().collect()
    }

    /// Names of all objects in a container (empty if it does not exist)
    pub fn object_names(&self, container: &str) -> Vec<String> {
        self.containers
            .read()
            .get(container)
            .map(|c| c.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains_object(&self, container: &str, name: &str) -> bool {
        self.containers
            .read()
            .get(container)
            .is_some_and(|c| c.objects.contains_key(name))
    }

    /// Number of listing requests served so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Sync key configured on a container
    pub fn sync_key(&self, container: &str) -> Option<String> {
        self.containers
            .read()
            .get(container)
            .and_then(|c| c.sync_key.clone())
    }
}

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn not_found(container: &str, name: Option<&str>) -> StorageError {
    match name {
        Some(name) => StorageError::NotFound(format!("{}/{}", container, name)),
        None => StorageError::NotFound(container.to_string()),
    }
}

/// Segments of a manifest, concatenated in name order. The pointer is a
/// literal name prefix; pointers written by the backend end with `/`.
fn segment_data(containers: &Containers, manifest: &str) -> Bytes {
    let (container, prefix) = manifest.split_once('/').unwrap_or((manifest, ""));
    let mut buf = BytesMut::new();
    if let Some(c) = containers.get(container) {
        for (_, segment) in c.objects.iter().filter(|(name, _)| name.starts_with(prefix)) {
            buf.extend_from_slice(&segment.data);
        }
    }
    buf.freeze()
}

/// Content as a reader sees it
fn materialize(containers: &Containers, object: &MemoryObject) -> Bytes {
    match &object.manifest {
        Some(manifest) => segment_data(containers, manifest),
        None => object.data.clone(),
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn account_info(&self) -> Result<AccountInfo> {
        let containers = self.containers.read();
        let mut info = AccountInfo {
            container_count: containers.len() as u64,
            ..Default::default()
        };
        for container in containers.values() {
            info.object_count += container.objects.len() as u64;
            info.bytes_used += container
                .objects
                .values()
                .map(|o| o.data.len() as u64)
                .sum::<u64>();
        }
        Ok(info)
    }

    async fn container_info(&self, container: &str) -> Result<Option<ContainerInfo>> {
        Ok(self.containers.read().get(container).map(|c| ContainerInfo {
            object_count: c.objects.len() as u64,
            bytes_used: c.objects.values().map(|o| o.data.len() as u64).sum(),
            sync_to: c.sync_to.clone(),
        }))
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        let mut containers = self.containers.write();
        match containers.get(container) {
            None => Err(not_found(container, None)),
            Some(c) if !c.objects.is_empty() => Err(StorageError::Api(format!(
                "409 Conflict: container {} is not empty",
                container
            ))),
            Some(_) => {
                containers.remove(container);
                Ok(())
            }
        }
    }

    async fn set_container_sync(&self, container: &str, sync_to: &str, key: &str) -> Result<()> {
        let mut containers = self.containers.write();
        let c = containers
            .get_mut(container)
            .ok_or_else(|| not_found(container, None))?;
        c.sync_to = Some(sync_to.to_string());
        c.sync_key = Some(key.to_string());
        Ok(())
    }

    async fn list_objects(&self, container: &str, query: &ListQuery) -> Result<Vec<ObjectEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let containers = self.containers.read();
        let c = containers
            .get(container)
            .ok_or_else(|| not_found(container, None))?;

        let lower = match &query.marker {
            Some(marker) => Bound::Excluded(marker.clone()),
            None => Bound::Unbounded,
        };
        let prefix = query.prefix.as_deref().unwrap_or("");

        Ok(c.objects
            .range((lower, Bound::Unbounded))
            .filter(|(name, _)| name.starts_with(prefix))
            .take(query.limit)
            .map(|(name, object)| ObjectEntry {
                name: name.clone(),
                bytes: object.data.len() as u64,
                content_type: object.content_type.clone(),
                hash: Some(object.etag.clone()),
                last_modified: Some(object.last_modified.to_rfc3339()),
            })
            .collect())
    }

    async fn head_object(&self, container: &str, name: &str) -> Result<Option<ObjectMeta>> {
        let containers = self.containers.read();
        let Some(object) = containers.get(container).and_then(|c| c.objects.get(name)) else {
            return Ok(None);
        };
        Ok(Some(ObjectMeta {
            content_length: materialize(&containers, object).len() as u64,
            content_type: object.content_type.clone(),
            manifest: object.manifest.clone(),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
        }))
    }

    async fn get_object(&self, container: &str, name: &str) -> Result<Option<ByteStream>> {
        let containers = self.containers.read();
        Ok(containers
            .get(container)
            .and_then(|c| c.objects.get(name))
            .map(|object| bytes_stream(materialize(&containers, object))))
    }

    async fn put_object(
        &self,
        container: &str,
        name: &str,
        data: ByteStream,
        content_type: &str,
    ) -> Result<()> {
        let data = collect_bytes(data).await?;
        let mut containers = self.containers.write();
        let c = containers
            .get_mut(container)
            .ok_or_else(|| not_found(container, None))?;
        c.objects
            .insert(name.to_string(), MemoryObject::new(data, content_type, None));
        Ok(())
    }

    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: &str,
        content_type: &str,
    ) -> Result<()> {
        let mut containers = self.containers.write();
        let c = containers
            .get_mut(container)
            .ok_or_else(|| not_found(container, None))?;
        c.objects.insert(
            name.to_string(),
            MemoryObject::new(Bytes::new(), content_type, Some(manifest.to_string())),
        );
        Ok(())
    }

    async fn copy_object(
        &self,
        src_container: &str,
        src_name: &str,
        dst_container: &str,
        dst_name: &str,
    ) -> Result<()> {
        let mut containers = self.containers.write();
        let source = containers
            .get(src_container)
            .and_then(|c| c.objects.get(src_name))
            .ok_or_else(|| not_found(src_container, Some(src_name)))?;
        let copy = MemoryObject::new(
            materialize(&containers, source),
            &source.content_type,
            None,
        );
        let dst = containers
            .get_mut(dst_container)
            .ok_or_else(|| not_found(dst_container, None))?;
        dst.objects.insert(dst_name.to_string(), copy);
        Ok(())
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<()> {
        self.containers
            .write()
            .get_mut(container)
            .and_then(|c| c.objects.remove(name))
            .map(|_| ())
            .ok_or_else(|| not_found(container, Some(name)))
    }

    fn storage_url(&self) -> &str {
        "memory://"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_head() {
        let client = MemoryObjectClient::new();
        client.create_container("cont").await.unwrap();
        client
            .put_object("cont", "a/b", bytes_stream("hello"), "text/plain")
            .await
            .unwrap();

        let meta = client.head_object("cont", "a/b").await.unwrap().unwrap();
        assert_eq!(meta.content_length, 5);
        assert_eq!(meta.content_type, "text/plain");
        assert!(meta.manifest.is_none());

        let data = client.get_object("cont", "a/b").await.unwrap().unwrap();
        assert_eq!(collect_bytes(data).await.unwrap().as_ref(), b"hello");

        assert!(client.head_object("cont", "missing").await.unwrap().is_none());
        assert!(client.get_object("nope", "a/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_into_missing_container_fails() {
        let client = MemoryObjectClient::new();
        let result = client
            .put_object("nope", "x", bytes_stream("x"), "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_manifest_reads_segments_in_order() {
        let client = MemoryObjectClient::new();
        client.create_container("chunked").await.unwrap();
        client.create_container("cont").await.unwrap();
        for (i, part) in ["one-", "two-", "three"].iter().enumerate() {
            client
                .put_object("chunked", &format!("up1/{:08}", i), bytes_stream(*part), "x")
                .await
                .unwrap();
        }
        client
            .put_manifest("cont", "big", "chunked/up1/", "application/file")
            .await
            .unwrap();

        let meta = client.head_object("cont", "big").await.unwrap().unwrap();
        assert_eq!(meta.manifest.as_deref(), Some("chunked/up1/"));
        assert_eq!(meta.content_length, 13);

        let data = client.get_object("cont", "big").await.unwrap().unwrap();
        assert_eq!(collect_bytes(data).await.unwrap().as_ref(), b"one-two-three");
    }

    #[tokio::test]
    async fn test_list_pages_with_marker_and_prefix() {
        let client = MemoryObjectClient::new();
        client.create_container("cont").await.unwrap();
        for name in ["a/1", "a/2", "a/3", "b/1"] {
            client
                .put_object("cont", name, bytes_stream("x"), "x")
                .await
                .unwrap();
        }

        let query = ListQuery::new(2).with_prefix("a/");
        let first = client.list_objects("cont", &query).await.unwrap();
        assert_eq!(first.len(), 2);

        let query = query.with_marker(first.last().map(|e| e.name.clone()));
        let second = client.list_objects("cont", &query).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "a/3");
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_container_requires_empty() {
        let client = MemoryObjectClient::new();
        client.create_container("cont").await.unwrap();
        client
            .put_object("cont", "x", bytes_stream("x"), "x")
            .await
            .unwrap();

        assert!(client.delete_container("cont").await.is_err());
        client.delete_object("cont", "x").await.unwrap();
        client.delete_container("cont").await.unwrap();
        assert!(client.container_names().is_empty());
    }
}
