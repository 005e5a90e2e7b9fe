//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作与弱引用节点句柄
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;

pub use dom::{
    find_body, get_child_node_by_name, get_node_attr, get_node_name, get_parent_node, html_to_dom,
    parse_html, set_node_attr, NodeRef,
};
pub use serializer::{serialize_document, serialize_node};
