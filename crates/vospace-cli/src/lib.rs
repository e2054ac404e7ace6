//! # VOSpace CLI
//!
//! Command-line access to a VOSpace node tree.
//!
//! This crate provides:
//! - **Configuration**: defaults, optional TOML file and `VOSPACE__*`
//!   environment variables
//! - **State**: a [`NodeFactory`](vospace_core::NodeFactory) over Swift or
//!   in-memory storage and a snapshotted metadata store
//! - **Commands**: listing, upload (plain or segmented), download, copy,
//!   move, soft and hard delete, export, search and container sync

pub mod commands;
pub mod config;
pub mod state;

pub use config::{StorageSettings, VoSpaceConfig};
pub use state::VoSpaceState;
