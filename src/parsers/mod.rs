//! # 解析器模块
//!
//! - `html` - HTML 文档解析、DOM 操作、序列化

pub mod html;

pub use html::{html_to_dom, parse_html, serialize_document};
