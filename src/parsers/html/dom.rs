use std::cell::RefCell;
use std::rc::{Rc, Weak};

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default()).one(s)
}

/// 解析 UTF-8 字符串
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    let matching_children = children.iter().find(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == node_name,
        _ => false,
    });
    matching_children.cloned()
}

/// 查找 body 元素（文档结构不完整时返回 None）
pub fn find_body(document: &Handle) -> Option<Handle> {
    let html = get_child_node_by_name(document, "html")?;
    get_child_node_by_name(&html, "body")
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点，不破坏节点上的父指针
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(Weak::upgrade);
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示删除；新属性追加在末尾
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 文本节点的内容
pub fn get_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 替换文本节点的内容，非文本节点返回 false
pub fn set_text(node: &Handle, text: &str) -> bool {
    match &node.data {
        NodeData::Text { contents } => {
            *contents.borrow_mut() = StrTendril::from_slice(text);
            true
        }
        _ => false,
    }
}

/// 节点子树的全部文本
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// 创建元素节点
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: &Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 从父节点移除
pub fn detach_node(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 节点是否仍挂在 `root` 之下（逐级校验父节点确实包含该子节点）
pub fn is_attached(root: &Handle, node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if Rc::ptr_eq(&current, root) {
            return true;
        }
        let Some(parent) = get_parent_node(&current) else {
            return false;
        };
        if !parent
            .children
            .borrow()
            .iter()
            .any(|child| Rc::ptr_eq(child, &current))
        {
            return false;
        }
        current = parent;
    }
}

/// 节点身份键（同一节点存活期间唯一）
pub fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

/// 对活动节点的弱引用，变更前重新解析
#[derive(Debug, Clone)]
pub struct NodeRef(Weak<Node>);

impl NodeRef {
    pub fn new(node: &Handle) -> Self {
        NodeRef(Rc::downgrade(node))
    }

    /// 节点已被释放时返回 None
    pub fn upgrade(&self) -> Option<Handle> {
        self.0.upgrade()
    }

    /// 只有仍挂在文档中的节点才会返回
    pub fn resolve(&self, document: &Handle) -> Option<Handle> {
        self.upgrade().filter(|node| is_attached(document, node))
    }

    pub fn key(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }

    pub fn is(&self, node: &Handle) -> bool {
        self.key() == node_key(node)
    }
}
