//! Node information kept alongside every node

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type reported for containers and the account root
pub const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

/// Content type for objects without a more specific type
pub const FILE_CONTENT_TYPE: &str = "application/file";

/// Size, timestamps and flags of a node.
///
/// The backend is the source of truth for `size` and `content_type`
/// (see [`crate::StorageBackend::update_node_info`]); the metadata store keeps
/// the rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub mtime: DateTime<Utc>,
    /// Revision counter, bumped on every content change
    pub revision: u64,
    /// MIME type
    pub content_type: String,
    /// Owner identity
    pub owner: String,
    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,
}

impl NodeInfo {
    /// Fresh info for a node that has no bytes yet
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            size: 0,
            mtime: Utc::now(),
            revision: 0,
            content_type: FILE_CONTENT_TYPE.to_string(),
            owner: owner.into(),
            deleted: false,
        }
    }

    /// Record a content change
    pub fn touch(&mut self) {
        self.mtime = Utc::now();
        self.revision += 1;
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_bumps_revision() {
        let mut info = NodeInfo::new("alice");
        let before = info.mtime;
        info.touch();
        info.touch();
        assert_eq!(info.revision, 2);
        assert!(info.mtime >= before);
        assert_eq!(info.content_type, FILE_CONTENT_TYPE);
    }
}
