//! # ling-translate
//!
//! 页面内翻译引擎：扫描 HTML 文档中的可翻译文本，按段落分组，
//! 在限速下调用对话补全接口，并把译文逐段写回文档。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、DOM 操作与序列化
//! - `translation` - 翻译引擎
//! - `env` - 环境变量覆盖

pub mod env;
pub mod parsers;
pub mod translation;

pub use translation::{RunController, TranslationError, TranslationResult};
