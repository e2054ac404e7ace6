//! Node export formats
//!
//! - `json-dropbox`: structured listing serialized to bytes, with an MD5
//!   hash at maximum detail
//! - `json-dropbox-object`: the same structure as an in-memory value
//! - anything else: XML node document
//!
//! Container content is exported separately as a streaming tar archive.

pub mod archive;
pub mod structured;
pub mod xml;

use crate::{Result, VoError};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Requested export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    JsonDropbox,
    JsonDropboxObject,
    Xml,
}

impl ExportFormat {
    /// Map a format name; unknown names select XML
    pub fn from_name(name: &str) -> Self {
        match name {
            "json-dropbox" => ExportFormat::JsonDropbox,
            "json-dropbox-object" => ExportFormat::JsonDropboxObject,
            _ => ExportFormat::Xml,
        }
    }

    pub fn is_structured(self) -> bool {
        !matches!(self, ExportFormat::Xml)
    }
}

impl From<&str> for ExportFormat {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

/// How much of a node an export includes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Detail {
    #[default]
    Min,
    Properties,
    Max,
}

impl FromStr for Detail {
    type Err = VoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Detail::Min),
            "properties" => Ok(Detail::Properties),
            "max" => Ok(Detail::Max),
            other => Err(VoError::BadRequest(format!("unknown detail level '{}'", other))),
        }
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Detail::Min => "min",
            Detail::Properties => "properties",
            Detail::Max => "max",
        })
    }
}

/// Result of a metadata export
#[derive(Clone, Debug, PartialEq)]
pub enum ExportOutput {
    /// Serialized document
    Bytes(Bytes),
    /// Structured value for embedding in a parent listing
    Json(serde_json::Value),
}

impl ExportOutput {
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            ExportOutput::Bytes(b) => Ok(b),
            ExportOutput::Json(v) => Ok(Bytes::from(serde_json::to_vec(&v)?)),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ExportOutput::Json(v) => Some(v),
            ExportOutput::Bytes(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("json-dropbox", ExportFormat::JsonDropbox)]
    #[case("json-dropbox-object", ExportFormat::JsonDropboxObject)]
    #[case("xml", ExportFormat::Xml)]
    #[case("", ExportFormat::Xml)]
    fn test_format_names(#[case] name: &str, #[case] expected: ExportFormat) {
        assert_eq!(ExportFormat::from_name(name), expected);
    }

    #[test]
    fn test_detail_parse() {
        assert_eq!("max".parse::<Detail>().unwrap(), Detail::Max);
        assert!(Detail::Properties > Detail::Min);
        assert!(matches!("full".parse::<Detail>(), Err(VoError::BadRequest(_))));
    }
}
