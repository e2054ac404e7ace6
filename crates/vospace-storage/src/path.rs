//! Node addressing
//!
//! A [`NodeAddress`] is `vos://<authority>/<container>/<relative/path>`. The
//! first segment of a [`NodePath`] names the backend container (bucket), the
//! remaining segments form the object name inside that container.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// URI scheme of node addresses
pub const VOS_SCHEME: &str = "vos";

/// Structural errors raised while parsing or combining paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A segment between two separators is empty
    #[error("empty path segment at position {position} in '{path}'")]
    EmptySegment { path: String, position: usize },

    /// A segment is not a usable node name
    #[error("invalid node name '{0}'")]
    InvalidName(String),

    /// The address does not follow `vos://<authority>/<path>`
    #[error("invalid node address '{0}': expected {VOS_SCHEME}://<authority>/<path>")]
    InvalidAddress(String),

    /// A relative path was requested against a node that is not an ancestor
    #[error("'{path}' is not a descendant of '{ancestor}'")]
    NotDescendant { path: String, ancestor: String },
}

/// Ordered sequence of path segments.
///
/// Equality and hashing only look at the segments; the app-container flag
/// changes how the path is presented to clients, not which node it names.
#[derive(Clone, Debug, Default)]
pub struct NodePath {
    segments: Vec<String>,
    app_container: bool,
}

impl NodePath {
    /// The root of the tree (no container selected)
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path. A single leading and trailing separator
    /// are accepted; empty segments anywhere else are rejected.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

        if trimmed.is_empty() {
            if path.len() > 1 {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                    position: 0,
                });
            }
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for (position, segment) in trimmed.split('/').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                    position,
                });
            }
            validate_name(segment)?;
            segments.push(segment.to_string());
        }

        Ok(Self {
            segments,
            app_container: false,
        })
    }

    /// Build a path from already split segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        for segment in &segments {
            validate_name(segment)?;
        }
        Ok(Self {
            segments,
            app_container: false,
        })
    }

    /// Mark the first segment as an application (sandbox) container
    pub fn with_app_container(mut self, enabled: bool) -> Self {
        self.app_container = enabled;
        self
    }

    pub fn is_app_container(&self) -> bool {
        self.app_container
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path names a backend container itself
    pub fn is_first_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// Backend container (bucket) name, empty at the root
    pub fn container_name(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// Object name inside the container, empty for the root and for containers
    pub fn relative_storage_path(&self) -> String {
        self.segments
            .iter()
            .skip(1)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Full path with a leading separator (`/` for the root)
    pub fn storage_path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Path as shown to clients: the app container segment is hidden
    pub fn outer_path(&self) -> String {
        if self.app_container {
            format!("/{}", self.segments.iter().skip(1).cloned().collect::<Vec<_>>().join("/"))
        } else {
            self.storage_path()
        }
    }

    /// Last segment, empty at the root
    pub fn node_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Parent path; the root is its own parent
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self {
            segments,
            app_container: self.app_container,
        }
    }

    /// Path of a direct child named `name`
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            segments,
            app_container: self.app_container,
        })
    }

    /// Concatenate a relative path under this one
    pub fn append(&self, relative: &NodePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self {
            segments,
            app_container: self.app_container,
        }
    }

    /// Strict descendant test: every segment of `ancestor` is a positional
    /// prefix of this path and this path is longer.
    pub fn is_descendant_of(&self, ancestor: &NodePath) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments.iter().zip(&ancestor.segments).all(|(a, b)| a == b)
    }

    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other.is_descendant_of(self)
    }

    /// Segments of this path below `ancestor`
    pub fn relative_to(&self, ancestor: &NodePath) -> Result<Self, PathError> {
        if !self.is_descendant_of(ancestor) {
            return Err(PathError::NotDescendant {
                path: self.storage_path(),
                ancestor: ancestor.storage_path(),
            });
        }
        Ok(Self {
            segments: self.segments[ancestor.segments.len()..].to_vec(),
            app_container: false,
        })
    }
}

fn validate_name(segment: &str) -> Result<(), PathError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\0')
    {
        return Err(PathError::InvalidName(segment.to_string()));
    }
    Ok(())
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for NodePath {}

impl Hash for NodePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_path())
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Authority plus path, e.g. `vos://edu.jhu!vospace/container/file`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    authority: String,
    path: NodePath,
}

impl NodeAddress {
    pub fn new(authority: impl Into<String>, path: NodePath) -> Self {
        Self {
            authority: authority.into(),
            path,
        }
    }

    /// Parse `vos://<authority>/<path>`
    pub fn parse(address: &str) -> Result<Self, PathError> {
        let rest = address
            .strip_prefix(VOS_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| PathError::InvalidAddress(address.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(PathError::InvalidAddress(address.to_string()));
        }

        Ok(Self {
            authority: authority.to_string(),
            path: NodePath::parse(path)?,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Same authority, different path
    pub fn with_path(&self, path: NodePath) -> Self {
        Self {
            authority: self.authority.clone(),
            path,
        }
    }

    /// Re-base a relative path under this address
    pub fn append_path(&self, relative: &NodePath) -> Self {
        self.with_path(self.path.append(relative))
    }

    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        Ok(self.with_path(self.path.child(name)?))
    }

    pub fn parent(&self) -> Self {
        self.with_path(self.path.parent())
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", VOS_SCHEME, self.authority, self.path.storage_path())
    }
}

impl FromStr for NodeAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NodeAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
