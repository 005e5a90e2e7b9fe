//! 文档副作用
//!
//! 加载徽标、已翻译标记、失败标记与回滚。写入译文前重新解析节点，
//! 已脱离文档的节点静默跳过；清理与回滚对脱离的节点同样执行。

use markup5ever_rcdom::Handle;

use super::item::{TranslatableUnit, TranslationItem};
use crate::parsers::html::dom::{
    append_child, create_element, create_text, detach_node, get_node_attr, get_text, set_node_attr, set_text,
};
use crate::translation::config::{constants, LoadingStyle};

pub struct DomMarkers {
    document: Handle,
    loading_style: LoadingStyle,
}

impl DomMarkers {
    pub fn new(document: Handle, loading_style: LoadingStyle) -> Self {
        Self {
            document,
            loading_style,
        }
    }

    pub fn document(&self) -> &Handle {
        &self.document
    }

    pub fn loading_style(&self) -> LoadingStyle {
        self.loading_style
    }

    /// 在容器末尾追加加载徽标；已存在或样式为 none 时返回 false
    pub fn apply_loading(&self, item: &TranslationItem) -> bool {
        if self.loading_style == LoadingStyle::None {
            return false;
        }
        let Some(element) = item.element.resolve(&self.document) else {
            return false;
        };
        if !loading_badges(&element).is_empty() {
            return false;
        }

        let mut attrs = vec![(constants::ATTR_LOADING, "true"), ("aria-hidden", "true")];
        if self.loading_style.shows_spinner() {
            attrs.push((constants::ATTR_CLASS, constants::CLASS_SPINNER));
        }
        let badge = create_element("span", &attrs);
        if self.loading_style.shows_text() {
            append_child(&badge, &create_text(constants::LOADING_TEXT));
        }
        append_child(&element, &badge);
        true
    }

    pub fn clear_loading(&self, item: &TranslationItem) {
        if let Some(element) = item.element.upgrade() {
            for badge in loading_badges(&element) {
                detach_node(&badge);
            }
        }
    }

    /// 写入单元译文，节点已脱离时返回 false
    pub fn write_translation(&self, unit: &TranslatableUnit, translated: &str) -> bool {
        match unit.node.resolve(&self.document) {
            Some(node) => set_text(&node, &unit.render(translated)),
            None => false,
        }
    }

    pub fn restore_unit(&self, unit: &TranslatableUnit) {
        if let Some(node) = unit.node.upgrade() {
            if get_text(&node).as_deref() != Some(unit.original_text.as_str()) {
                set_text(&node, &unit.original_text);
            }
        }
    }

    /// 已翻译标记、目标语言与原文提示
    pub fn mark_translated(&self, item: &TranslationItem, to: &str) -> bool {
        let Some(element) = item.element.resolve(&self.document) else {
            return false;
        };
        let summary = item.original_summary();
        if !summary.is_empty() {
            set_node_attr(&element, constants::ATTR_TITLE, Some(summary));
        }
        set_node_attr(&element, constants::ATTR_TRANSLATED, Some("true".to_string()));
        set_node_attr(&element, constants::ATTR_TRANSLATED_LANG, Some(to.to_string()));
        true
    }

    /// 失败标记：错误样式类、原因属性和提示
    pub fn mark_failed(&self, item: &TranslationItem, reason: &str) -> bool {
        let Some(element) = item.element.resolve(&self.document) else {
            return false;
        };
        let class = match get_node_attr(&element, constants::ATTR_CLASS) {
            Some(existing) if existing.split_whitespace().any(|c| c == constants::CLASS_ERROR) => existing,
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing, constants::CLASS_ERROR),
            _ => constants::CLASS_ERROR.to_string(),
        };
        set_node_attr(&element, constants::ATTR_CLASS, Some(class));
        set_node_attr(&element, constants::ATTR_ERROR, Some(reason.to_string()));
        set_node_attr(&element, constants::ATTR_TITLE, Some(format!("翻译失败: {}", reason)));
        true
    }

    /// 回滚条目的全部副作用
    pub fn roll_back(&self, item: &TranslationItem) {
        self.clear_loading(item);
        for unit in &item.units {
            self.restore_unit(unit);
        }

        let Some(element) = item.element.upgrade() else {
            return;
        };
        set_node_attr(&element, constants::ATTR_TRANSLATED, None);
        set_node_attr(&element, constants::ATTR_TRANSLATED_LANG, None);
        set_node_attr(&element, constants::ATTR_ERROR, None);
        set_node_attr(&element, constants::ATTR_TITLE, item.original_title.clone());
        set_node_attr(&element, constants::ATTR_CLASS, item.original_class.clone());
    }
}

fn loading_badges(element: &Handle) -> Vec<Handle> {
    element
        .children
        .borrow()
        .iter()
        .filter(|child| get_node_attr(child, constants::ATTR_LOADING).as_deref() == Some("true"))
        .cloned()
        .collect()
}
