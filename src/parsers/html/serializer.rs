use std::io;

use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, NodeData, SerializableHandle};

/// 序列化节点：文档节点只输出子节点，其它节点包含自身
pub fn serialize_node(node: &Handle) -> io::Result<String> {
    let traversal_scope = match node.data {
        NodeData::Document => TraversalScope::ChildrenOnly(None),
        _ => TraversalScope::IncludeNode,
    };

    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    serialize(
        &mut buf,
        &serializable,
        SerializeOpts {
            traversal_scope,
            ..Default::default()
        },
    )?;

    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// 序列化文档并按原始编码输出
pub fn serialize_document(document: &Handle, document_encoding: &str) -> io::Result<Vec<u8>> {
    let html = serialize_node(document)?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let (data, _, _) = encoding.encode(&html);
            return Ok(data.into_owned());
        }
    }

    Ok(html.into_bytes())
}
