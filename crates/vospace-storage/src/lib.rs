//! # VOSpace Storage
//!
//! Object storage layer for the VOSpace node tree.
//!
//! This crate provides:
//! - **Node addressing**: `vos://` addresses and the path algebra over them
//! - **Storage contract**: the [`StorageBackend`] trait the node model drives
//! - **Chunked objects**: manifest objects over segment groups, with cleanup
//! - **Backends**: an OpenStack Swift client and an in-memory client
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Node model (vospace-core)      │
//! ├─────────────────────────────────────────┤
//! │          StorageBackend Trait           │
//! ├─────────────────────────────────────────┤
//! │   ObjectStorage (paging, manifests)     │
//! ├───────────────────┬─────────────────────┤
//! │    SwiftClient    │ MemoryObjectClient  │
//! └───────────────────┴─────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use vospace_storage::{MemoryObjectClient, NodePath, ObjectStorage, StorageBackend};
//!
//! let storage = ObjectStorage::new(MemoryObjectClient::new());
//! storage.create_container(&NodePath::parse("/photos")?).await?;
//! let bytes = storage.get_bytes(&NodePath::parse("/photos/missing.jpg")?).await?;
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod info;
pub mod memory;
pub mod path;
pub mod swift;

pub use backend::{ObjectStorage, StorageConfig};
pub use client::{AccountInfo, ContainerInfo, ListQuery, ObjectClient, ObjectEntry, ObjectMeta};
pub use error::{Result, StorageError};
pub use info::{NodeInfo, DIRECTORY_CONTENT_TYPE, FILE_CONTENT_TYPE};
pub use memory::MemoryObjectClient;
pub use path::{NodeAddress, NodePath, PathError, VOS_SCHEME};
pub use swift::{SwiftClient, SwiftConfig};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};

/// Default number of objects requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default container holding chunked-upload segments
pub const DEFAULT_CHUNKED_CONTAINER: &str = "chunked";

/// Owned stream of object bytes
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A stream that yields nothing
pub fn empty_stream() -> ByteStream {
    stream::empty().boxed()
}

/// A stream over a single in-memory buffer
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    if data.is_empty() {
        return empty_stream();
    }
    stream::once(async move { Ok(data) }).boxed()
}

/// Drain a stream into one buffer
pub async fn collect_bytes(mut data: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = data.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Storage operations the node model relies on
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create the backend container for a first-level path. Idempotent; a
    /// no-op for deeper paths and for the (unnamed) root.
    async fn create_container(&self, path: &NodePath) -> Result<()>;

    /// Object content; an empty stream when the object does not exist
    async fn get_bytes(&self, path: &NodePath) -> Result<ByteStream>;

    /// Write or overwrite object content
    async fn put_bytes(&self, path: &NodePath, data: ByteStream) -> Result<()>;

    /// Server-side copy. Absent sources are a no-op; chunked sources cannot
    /// be copied while keeping the original.
    async fn copy_bytes(&self, old_path: &NodePath, new_path: &NodePath, keep_bytes: bool)
        -> Result<()>;

    /// Best-effort removal of a container or of an object and everything
    /// stored under `path/`
    async fn remove(&self, path: &NodePath, remove_chunks: bool) -> Result<()>;

    /// Recompute size and content type from the backend
    async fn update_node_info(&self, path: &NodePath, info: &mut NodeInfo) -> Result<()>;

    /// Point the object at `path` to the segment group `chunk_id`
    async fn put_chunked_bytes(&self, path: &NodePath, chunk_id: &str) -> Result<()>;

    /// Upload one segment of the group `chunk_id`
    async fn put_object_segment(&self, chunk_id: &str, sequence: u32, data: ByteStream)
        -> Result<()>;

    /// Delete every segment of the group `chunk_id`
    async fn remove_object_segment(&self, chunk_id: &str) -> Result<()>;

    /// Replication target of a container
    async fn get_sync_address(&self, container: &str) -> Result<Option<String>>;

    /// Configure replication of a container
    async fn set_sync_to(&self, container: &str, sync_to: &str, key: &str) -> Result<()>;

    /// Account-wide usage in bytes
    async fn get_bytes_used(&self) -> Result<u64>;

    fn storage_url(&self) -> String;
}
