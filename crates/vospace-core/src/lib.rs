//! # VOSpace Core
//!
//! Node model of the VOSpace tree, kept consistent across a metadata store
//! and an object storage backend.
//!
//! This crate provides:
//! - **Nodes**: containers and data nodes with copy, move, soft delete,
//!   restore and hard removal over whole subtrees
//! - **Metadata store**: the [`MetaStore`] contract and an in-memory store
//! - **Events**: fire-and-forget change notifications on a fanout exchange
//! - **Export**: structured listings with content hash, XML documents and
//!   streaming tar archives
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Request layer / vospace CLI      │
//! ├─────────────────────────────────────────┤
//! │   NodeFactory → ContainerNode/DataNode  │
//! ├──────────────┬─────────────┬────────────┤
//! │  MetaStore   │  Storage    │  Events    │
//! │              │  Backend    │            │
//! └──────────────┴─────────────┴────────────┘
//! ```

pub mod error;
pub mod events;
pub mod export;
pub mod memory_meta;
pub mod metastore;
pub mod node;

pub use error::{Result, VoError};
pub use events::{BroadcastPool, ChannelPool, EventChannel, EventPublisher, NodeEvent, DEFAULT_EXCHANGE};
pub use export::{Detail, ExportFormat, ExportOutput};
pub use memory_meta::MemoryMetaStore;
pub use metastore::{
    DistributedMetaStore, MetaStore, NodeKind, NodeRecord, NodesList, Properties, Regions,
};
pub use node::{ContainerNode, DataNode, Node, NodeFactory};
