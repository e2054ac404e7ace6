//! [`StorageBackend`] on top of any [`ObjectClient`]
//!
//! Chunked objects are empty manifest objects whose `X-Object-Manifest`
//! points at `container/prefix`; every object under that prefix is a segment.
//! A manifest must never be deleted or repointed before its old segments are
//! reclaimed, otherwise they stay in the store forever.

use crate::client::{ListQuery, ObjectClient, ObjectMeta};
use crate::{
    empty_stream, ByteStream, NodeInfo, NodePath, Result, StorageBackend, StorageError,
    DEFAULT_CHUNKED_CONTAINER, DEFAULT_PAGE_SIZE, DIRECTORY_CONTENT_TYPE, FILE_CONTENT_TYPE,
};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

/// Tunables of the object storage layer
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Objects per listing page in bulk operations
    pub page_size: usize,
    /// Container holding the segments of chunked uploads
    pub chunked_container: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            chunked_container: DEFAULT_CHUNKED_CONTAINER.to_string(),
        }
    }
}

/// Node storage over a Swift-style object client
pub struct ObjectStorage<C: ObjectClient> {
    client: C,
    config: StorageConfig,
}

impl<C: ObjectClient> ObjectStorage<C> {
    /// Create with the default configuration
    pub fn new(client: C) -> Self {
        Self::with_config(client, StorageConfig::default())
    }

    pub fn with_config(client: C, config: StorageConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Manifest pointer covering exactly the segments under `chunk_id/`
    fn manifest_for(&self, chunk_id: &str) -> String {
        format!("{}/{}/", self.config.chunked_container, chunk_id)
    }

    /// HEAD that treats a missing container like a missing object
    async fn head(&self, container: &str, name: &str) -> Result<Option<ObjectMeta>> {
        match self.client.head_object(container, name).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    /// Delete every segment under a manifest pointer. Individual failures
    /// are logged and skipped.
    async fn remove_segments(&self, manifest: &str) -> Result<usize> {
        let (container, prefix) = manifest.split_once('/').unwrap_or((manifest, ""));
        let mut marker = None;
        let mut removed = 0;

        loop {
            let query = ListQuery::new(self.config.page_size)
                .with_prefix(prefix)
                .with_marker(marker.take());
            let page = match self.client.list_objects(container, &query).await {
                Ok(page) => page,
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e),
            };
            let Some(last) = page.last() else { break };
            marker = Some(last.name.clone());

            for segment in &page {
                match self.client.delete_object(container, &segment.name).await {
                    Ok(()) => {
                        removed += 1;
                        debug!(segment = %segment.name, "deleted segment");
                    }
                    Err(e) => warn!(segment = %segment.name, error = %e, "failed to delete segment"),
                }
            }
        }

        Ok(removed)
    }

    /// Reclaim the segments of one object if it is a manifest
    async fn remove_object_segments(&self, container: &str, name: &str) -> Result<()> {
        if let Some(ObjectMeta {
            manifest: Some(manifest),
            ..
        }) = self.head(container, name).await?
        {
            self.remove_segments(&manifest).await?;
        }
        Ok(())
    }

    /// Best-effort delete of one object
    async fn delete_quietly(&self, container: &str, name: &str, remove_chunks: bool) {
        if remove_chunks {
            if let Err(e) = self.remove_object_segments(container, name).await {
                debug!(container, name, error = %e, "segment cleanup failed");
            }
        }
        if let Err(e) = self.client.delete_object(container, name).await {
            debug!(container, name, error = %e, "delete failed");
        }
    }

    /// List and delete page after page until a page comes back empty
    async fn purge(&self, container: &str, prefix: Option<String>, remove_chunks: bool) -> Result<()> {
        let mut marker = None;
        loop {
            let mut query = ListQuery::new(self.config.page_size).with_marker(marker.take());
            query.prefix = prefix.clone();

            let page = self.client.list_objects(container, &query).await?;
            let Some(last) = page.last() else { break };
            marker = Some(last.name.clone());

            debug!(container, count = page.len(), "removing page of objects");
            for object in &page {
                self.delete_quietly(container, &object.name, remove_chunks).await;
            }
        }
        Ok(())
    }
}

fn object_path(path: &NodePath) -> Result<(&str, String)> {
    let name = path.relative_storage_path();
    if name.is_empty() {
        return Err(StorageError::BadRequest(format!(
            "{} is not an object path",
            path
        )));
    }
    Ok((path.container_name(), name))
}

#[async_trait]
impl<C: ObjectClient> StorageBackend for ObjectStorage<C> {
    #[instrument(skip(self), fields(path = %path))]
    async fn create_container(&self, path: &NodePath) -> Result<()> {
        if !path.is_first_level() {
            return Ok(());
        }
        let container = path.container_name();
        if self.client.container_info(container).await?.is_none() {
            debug!(container, "creating container");
            self.client.create_container(container).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get_bytes(&self, path: &NodePath) -> Result<ByteStream> {
        if path.depth() < 2 {
            return Ok(empty_stream());
        }
        let name = path.relative_storage_path();
        match self.client.get_object(path.container_name(), &name).await {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Ok(empty_stream()),
            Err(e) if e.is_not_found() => Ok(empty_stream()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, data), fields(path = %path))]
    async fn put_bytes(&self, path: &NodePath, data: ByteStream) -> Result<()> {
        let (container, name) = object_path(path)?;
        self.client
            .put_object(container, &name, data, FILE_CONTENT_TYPE)
            .await
    }

    #[instrument(skip(self), fields(from = %old_path, to = %new_path))]
    async fn copy_bytes(
        &self,
        old_path: &NodePath,
        new_path: &NodePath,
        keep_bytes: bool,
    ) -> Result<()> {
        if old_path.depth() < 2 {
            return Ok(());
        }
        let old_name = old_path.relative_storage_path();
        let Some(meta) = self.head(old_path.container_name(), &old_name).await? else {
            // metadata-only node without bytes
            return Ok(());
        };

        if meta.manifest.is_some() && keep_bytes {
            return Err(StorageError::BadRequest(
                "Copying files with segments is not supported.".to_string(),
            ));
        }

        let (new_container, new_name) = object_path(new_path)?;
        self.client
            .copy_object(old_path.container_name(), &old_name, new_container, &new_name)
            .await?;

        if !keep_bytes {
            if let Some(manifest) = &meta.manifest {
                self.remove_segments(manifest).await?;
            }
            self.client
                .delete_object(old_path.container_name(), &old_name)
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn remove(&self, path: &NodePath, remove_chunks: bool) -> Result<()> {
        let container = path.container_name();
        if container.is_empty() {
            warn!("refusing to remove the account root");
            return Ok(());
        }

        if path.is_first_level() {
            match self.purge(container, None, remove_chunks).await {
                Err(e) if e.is_not_found() => return Ok(()),
                other => other?,
            }
            if let Err(e) = self.client.delete_container(container).await {
                debug!(container, error = %e, "container delete failed");
            }
        } else {
            let name = path.relative_storage_path();
            match self
                .purge(container, Some(format!("{}/", name)), remove_chunks)
                .await
            {
                Err(e) if e.is_not_found() => return Ok(()),
                other => other?,
            }
            self.delete_quietly(container, &name, remove_chunks).await;
        }
        Ok(())
    }

    #[instrument(skip(self, info), fields(path = %path))]
    async fn update_node_info(&self, path: &NodePath, info: &mut NodeInfo) -> Result<()> {
        if path.is_root() {
            let account = self.client.account_info().await?;
            info.size = account.bytes_used;
            info.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        } else if path.is_first_level() {
            let Some(container) = self.client.container_info(path.container_name()).await? else {
                return Ok(());
            };
            info.size = container.bytes_used;
            info.content_type = DIRECTORY_CONTENT_TYPE.to_string();
        } else {
            let name = path.relative_storage_path();
            match self.head(path.container_name(), &name).await? {
                Some(meta) => {
                    info.size = meta.content_length;
                    info.content_type = meta.content_type;
                }
                None => {
                    debug!("info for non-existent object");
                    info.size = 0;
                    info.content_type = FILE_CONTENT_TYPE.to_string();
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn put_chunked_bytes(&self, path: &NodePath, chunk_id: &str) -> Result<()> {
        let (container, name) = object_path(path)?;
        let manifest = self.manifest_for(chunk_id);

        if let Some(ObjectMeta {
            manifest: Some(old),
            ..
        }) = self.head(container, &name).await?
        {
            if old != manifest {
                let removed = self.remove_segments(&old).await?;
                debug!(old = %old, removed, "reclaimed previous segments");
            }
        }

        self.client
            .put_manifest(container, &name, &manifest, FILE_CONTENT_TYPE)
            .await
    }

    #[instrument(skip(self, data))]
    async fn put_object_segment(
        &self,
        chunk_id: &str,
        sequence: u32,
        data: ByteStream,
    ) -> Result<()> {
        let container = self.config.chunked_container.as_str();
        if self.client.container_info(container).await?.is_none() {
            self.client.create_container(container).await?;
        }
        self.client
            .put_object(
                container,
                &format!("{}/{:08}", chunk_id, sequence),
                data,
                "application/octet-stream",
            )
            .await
    }

    #[instrument(skip(self))]
    async fn remove_object_segment(&self, chunk_id: &str) -> Result<()> {
        let removed = self.remove_segments(&self.manifest_for(chunk_id)).await?;
        debug!(removed, "removed segment group");
        Ok(())
    }

    async fn get_sync_address(&self, container: &str) -> Result<Option<String>> {
        self.client
            .container_info(container)
            .await?
            .map(|info| info.sync_to)
            .ok_or_else(|| StorageError::NotFound(container.to_string()))
    }

    async fn set_sync_to(&self, container: &str, sync_to: &str, key: &str) -> Result<()> {
        self.client.set_container_sync(container, sync_to, key).await
    }

    async fn get_bytes_used(&self) -> Result<u64> {
        Ok(self.client.account_info().await?.bytes_used)
    }

    fn storage_url(&self) -> String {
        self.client.storage_url().to_string()
    }
}
