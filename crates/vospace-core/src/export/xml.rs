//! VOSpace XML node documents

use super::Detail;
use crate::metastore::{NodeKind, NodeRecord, Properties};
use crate::{Result, VoError};
use bytes::Bytes;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use vospace_storage::{NodeAddress, NodeInfo};

const VOS_NS: &str = "http://www.ivoa.net/xml/VOSpace/v2.0";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const CORE_LENGTH: &str = "ivo://ivoa.net/vospace/core#length";
const CORE_DATE: &str = "ivo://ivoa.net/vospace/core#date";
const CORE_TYPE: &str = "ivo://ivoa.net/vospace/core#type";

fn xml_error(err: impl Display) -> VoError {
    VoError::InternalServerError(format!("Error generating XML: {}", err))
}

struct Document {
    writer: Writer<Vec<u8>>,
}

impl Document {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn start(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.write(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn property(&mut self, uri: &str, value: &str) -> Result<()> {
        let mut element = BytesStart::new("vos:property");
        element.push_attribute(("uri", uri));
        self.start(element)?;
        self.write(Event::Text(BytesText::new(value)))?;
        self.end("vos:property")
    }

    fn finish(self) -> Bytes {
        Bytes::from(self.writer.into_inner())
    }
}

/// XML document describing one node. Properties are listed from
/// [`Detail::Properties`] up, child references only at [`Detail::Max`].
pub fn node_document(
    address: &NodeAddress,
    kind: NodeKind,
    info: &NodeInfo,
    detail: Detail,
    properties: &Properties,
    children: &[NodeRecord],
) -> Result<Bytes> {
    let mut doc = Document::new();
    doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let uri = address.to_string();
    let node_type = format!("vos:{}", kind);
    let mut root = BytesStart::new("vos:node");
    root.push_attribute(("xmlns:vos", VOS_NS));
    root.push_attribute(("xmlns:xsi", XSI_NS));
    root.push_attribute(("uri", uri.as_str()));
    root.push_attribute(("xsi:type", node_type.as_str()));
    doc.start(root)?;

    doc.start(BytesStart::new("vos:properties"))?;
    if detail >= Detail::Properties {
        doc.property(CORE_LENGTH, &info.size.to_string())?;
        doc.property(CORE_DATE, &info.mtime.to_rfc3339())?;
        doc.property(CORE_TYPE, &info.content_type)?;
        for (name, value) in properties {
            doc.property(name, value)?;
        }
    }
    doc.end("vos:properties")?;

    if kind.is_container() {
        doc.start(BytesStart::new("vos:nodes"))?;
        if detail == Detail::Max {
            for child in children {
                let child_uri = child.address.to_string();
                let mut element = BytesStart::new("vos:node");
                element.push_attribute(("uri", child_uri.as_str()));
                doc.write(Event::Empty(element))?;
            }
        }
        doc.end("vos:nodes")?;
    }

    doc.end("vos:node")?;
    Ok(doc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str) -> NodeRecord {
        NodeRecord {
            address: NodeAddress::parse(address).unwrap(),
            kind: NodeKind::Data,
            info: NodeInfo::new("alice"),
        }
    }

    #[test]
    fn test_container_document_at_max() {
        let address = NodeAddress::parse("vos://auth/A").unwrap();
        let mut props = Properties::new();
        props.insert("ivo://example/color".into(), "red & blue".into());
        let children = [record("vos://auth/A/f")];

        let xml = node_document(
            &address,
            NodeKind::Container,
            &NodeInfo::new("alice"),
            Detail::Max,
            &props,
            &children,
        )
        .unwrap();
        let text = String::from_utf8(xml.to_vec()).unwrap();

        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("xsi:type=\"vos:ContainerNode\""));
        assert!(text.contains("red &amp; blue"));
        assert!(text.contains("<vos:node uri=\"vos://auth/A/f\"/>"));
    }

    #[test]
    fn test_min_detail_omits_properties() {
        let address = NodeAddress::parse("vos://auth/A/f").unwrap();
        let mut props = Properties::new();
        props.insert("k".into(), "v".into());

        let xml = node_document(
            &address,
            NodeKind::Data,
            &NodeInfo::new("alice"),
            Detail::Min,
            &props,
            &[],
        )
        .unwrap();
        let text = String::from_utf8(xml.to_vec()).unwrap();

        assert!(!text.contains("vos:property "));
        assert!(!text.contains("vos:nodes"));
        assert!(text.contains("vos:DataNode"));
    }
}
