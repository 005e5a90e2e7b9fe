//! 元素过滤器模块
//!
//! 判断元素子树是否参与扫描、容器是否已翻译、文本是否值得翻译

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{get_node_attr, get_node_name};
use crate::translation::config::constants;

/// 元素过滤器
#[derive(Debug, Clone)]
pub struct ElementFilter {
    skip_elements: HashSet<String>,
}

/// `contenteditable` 属性对子树的影响
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Editable {
    /// 未声明，继承父级
    Inherit,
    Editable,
    NotEditable,
}

impl ElementFilter {
    /// 创建新的过滤器，使用默认排除列表
    pub fn new() -> Self {
        Self::with_skip_elements(constants::SKIP_ELEMENTS.iter().copied())
    }

    pub fn with_skip_elements<'a>(tags: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            skip_elements: tags.into_iter().map(|tag| tag.to_ascii_lowercase()).collect(),
        }
    }

    /// 元素连同子树一起跳过（排除的标签或引擎自己的加载徽标）
    pub fn is_skipped_element(&self, node: &Handle) -> bool {
        match get_node_name(node) {
            Some(name) => {
                self.skip_elements.contains(&name.to_ascii_lowercase())
                    || get_node_attr(node, constants::ATTR_LOADING).as_deref() == Some("true")
            }
            None => false,
        }
    }

    /// 元素自身声明的可编辑状态
    pub fn editable(&self, node: &Handle) -> Editable {
        match get_node_attr(node, constants::ATTR_CONTENT_EDITABLE) {
            None => Editable::Inherit,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "false" => Editable::NotEditable,
                "" | "true" | "plaintext-only" => Editable::Editable,
                // 非法取值按继承处理
                _ => Editable::Inherit,
            },
        }
    }

    /// 容器是否带有已翻译标记
    pub fn is_translated(&self, node: &Handle) -> bool {
        get_node_attr(node, constants::ATTR_TRANSLATED).as_deref() == Some("true")
    }

    /// 文本是否包含可翻译内容
    pub fn is_translatable_text(&self, text: &str) -> bool {
        !text.trim().is_empty()
    }
}

impl Default for ElementFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Editable {
    /// 根据父级状态计算子树状态
    pub fn resolve(self, parent_editable: bool) -> bool {
        match self {
            Editable::Inherit => parent_editable,
            Editable::Editable => true,
            Editable::NotEditable => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_body, parse_html};

    fn first_element(html: &str) -> (markup5ever_rcdom::RcDom, Handle) {
        let dom = parse_html(html);
        let body = find_body(&dom.document).unwrap();
        let el = body.children.borrow()[0].clone();
        (dom, el)
    }

    #[test]
    fn test_skip_elements() {
        let filter = ElementFilter::new();
        for html in ["<code>x</code>", "<pre>x</pre>", "<textarea>x</textarea>", "<svg></svg>"] {
            let (_dom, el) = first_element(html);
            assert!(filter.is_skipped_element(&el), "{} should be skipped", html);
        }
        let (_dom, el) = first_element("<p>x</p>");
        assert!(!filter.is_skipped_element(&el));

        let (_dom, el) = first_element("<span data-translate-loading=\"true\">…</span>");
        assert!(filter.is_skipped_element(&el));
    }

    #[test]
    fn test_custom_skip_list() {
        let filter = ElementFilter::with_skip_elements(["P"]);
        let (_dom, el) = first_element("<p>x</p>");
        assert!(filter.is_skipped_element(&el));
    }

    #[test]
    fn test_editable_states() {
        let filter = ElementFilter::new();
        let (_dom, el) = first_element("<div contenteditable>x</div>");
        assert_eq!(filter.editable(&el), Editable::Editable);
        let (_dom, el) = first_element("<div contenteditable=\"false\">x</div>");
        assert_eq!(filter.editable(&el), Editable::NotEditable);
        let (_dom, el) = first_element("<div>x</div>");
        assert_eq!(filter.editable(&el), Editable::Inherit);

        assert!(Editable::Inherit.resolve(true));
        assert!(!Editable::NotEditable.resolve(true));
    }

    #[test]
    fn test_translated_marker_and_text() {
        let filter = ElementFilter::new();
        let (_dom, el) = first_element("<p data-translated=\"true\">x</p>");
        assert!(filter.is_translated(&el));
        assert!(filter.is_translatable_text(" hi "));
        assert!(!filter.is_translatable_text(" \n\t "));
    }
}
