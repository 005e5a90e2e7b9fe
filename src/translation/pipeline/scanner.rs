//! 文本扫描器模块
//!
//! 遍历文档中的文本节点，按最近的父元素分组。遍历是协作式的：
//! 每用完一个时间片就让出执行权，大文档不会长时间阻塞宿主。

use std::collections::HashMap;
use std::time::Duration;

use markup5ever_rcdom::{Handle, NodeData};
use tokio::time::Instant;

use super::filters::ElementFilter;
use crate::parsers::html::dom::{find_body, get_parent_node, node_key};
use crate::translation::config::constants;

/// 一个容器及其下的文本节点（文档顺序）
#[derive(Debug, Clone)]
pub struct ScannedGroup {
    pub container: Handle,
    pub text_nodes: Vec<Handle>,
}

/// 扫描统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub visited_nodes: usize,
    pub skipped_subtrees: usize,
    pub editable_texts: usize,
    pub translated_texts: usize,
    pub collected_texts: usize,
    pub yields: usize,
}

/// 扫描器配置
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// 连续执行的最长时间
    pub time_slice: Duration,
    /// 每访问多少个节点检查一次时间
    pub check_interval: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            time_slice: Duration::from_millis(constants::DEFAULT_SCAN_SLICE_MS),
            check_interval: constants::SCAN_CHECK_INTERVAL,
        }
    }
}

/// 文本扫描器
pub struct TextScanner {
    config: ScannerConfig,
    filter: ElementFilter,
    stats: ScanStats,
}

struct Frame {
    node: Handle,
    editable: bool,
}

impl TextScanner {
    /// 创建新的文本扫描器
    pub fn new(config: ScannerConfig) -> Self {
        Self::with_filter(config, ElementFilter::new())
    }

    pub fn with_filter(config: ScannerConfig, filter: ElementFilter) -> Self {
        Self {
            config,
            filter,
            stats: ScanStats::default(),
        }
    }

    /// 最近一次扫描的统计
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// 扫描文档，返回按容器分组的文本节点
    pub async fn scan(&mut self, document: &Handle) -> Vec<ScannedGroup> {
        self.stats = ScanStats::default();

        let root = find_body(document).unwrap_or_else(|| document.clone());
        let mut groups: Vec<ScannedGroup> = Vec::new();
        let mut index_by_container: HashMap<usize, usize> = HashMap::new();

        let mut stack = vec![Frame {
            node: root,
            editable: false,
        }];
        let check_interval = self.config.check_interval.max(1);
        let mut slice_start = Instant::now();

        while let Some(frame) = stack.pop() {
            self.stats.visited_nodes += 1;

            if self.stats.visited_nodes % check_interval == 0
                && slice_start.elapsed() >= self.config.time_slice
            {
                tokio::task::yield_now().await;
                self.stats.yields += 1;
                slice_start = Instant::now();
            }

            match &frame.node.data {
                NodeData::Element { .. } => {
                    if self.filter.is_skipped_element(&frame.node) {
                        self.stats.skipped_subtrees += 1;
                        continue;
                    }
                    let editable = self.filter.editable(&frame.node).resolve(frame.editable);
                    let children: Vec<Handle> = frame.node.children.borrow().iter().rev().cloned().collect();
                    stack.extend(children.into_iter().map(|node| Frame { node, editable }));
                }
                NodeData::Text { contents } => {
                    if frame.editable {
                        self.stats.editable_texts += 1;
                        continue;
                    }
                    if !self.filter.is_translatable_text(&contents.borrow()) {
                        continue;
                    }
                    let Some(container) = get_parent_node(&frame.node) else {
                        continue;
                    };
                    if !matches!(container.data, NodeData::Element { .. }) {
                        continue;
                    }
                    if self.filter.is_translated(&container) {
                        self.stats.translated_texts += 1;
                        continue;
                    }

                    self.stats.collected_texts += 1;
                    let key = node_key(&container);
                    match index_by_container.get(&key) {
                        Some(&index) => groups[index].text_nodes.push(frame.node.clone()),
                        None => {
                            index_by_container.insert(key, groups.len());
                            groups.push(ScannedGroup {
                                container,
                                text_nodes: vec![frame.node.clone()],
                            });
                        }
                    }
                }
                NodeData::Document => {
                    let children: Vec<Handle> = frame.node.children.borrow().iter().rev().cloned().collect();
                    stack.extend(children.into_iter().map(|node| Frame {
                        node,
                        editable: frame.editable,
                    }));
                }
                _ => {}
            }
        }

        tracing::debug!(
            target: "ling_translate::dom",
            "扫描完成: {} 个容器, {} 个文本节点, 访问 {} 个节点, 让出 {} 次",
            groups.len(),
            self.stats.collected_texts,
            self.stats.visited_nodes,
            self.stats.yields
        );

        groups
    }
}

impl Default for TextScanner {
    fn default() -> Self {
        Self::new(ScannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{get_node_name, get_text, parse_html};

    fn summarize(groups: &[ScannedGroup]) -> Vec<(String, Vec<String>)> {
        groups
            .iter()
            .map(|g| {
                (
                    get_node_name(&g.container).unwrap_or("").to_string(),
                    g.text_nodes.iter().map(|t| get_text(t).unwrap_or_default()).collect(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scan_groups_by_parent_in_document_order() {
        let dom = parse_html(
            "<h1>Title</h1><p>One <b>bold</b> two</p><div>  \n </div><ul><li>Item</li></ul>",
        );
        let mut scanner = TextScanner::default();
        let groups = scanner.scan(&dom.document).await;

        assert_eq!(
            summarize(&groups),
            vec![
                ("h1".to_string(), vec!["Title".to_string()]),
                ("p".to_string(), vec!["One ".to_string(), " two".to_string()]),
                ("b".to_string(), vec!["bold".to_string()]),
                ("li".to_string(), vec!["Item".to_string()]),
            ]
        );
        assert_eq!(scanner.stats().collected_texts, 5);
    }

    #[tokio::test]
    async fn test_scan_exclusions() {
        let dom = parse_html(
            "<p>keep</p>\
             <pre><span>code</span></pre>\
             <script>var a = 1;</script>\
             <div contenteditable=\"true\"><p>editing</p><p contenteditable=\"false\">locked</p></div>\
             <p data-translated=\"true\">done</p>\
             <button>Press</button>",
        );
        let mut scanner = TextScanner::default();
        let groups = scanner.scan(&dom.document).await;

        let texts: Vec<String> = summarize(&groups).into_iter().flat_map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["keep", "locked", "Press"]);
        assert_eq!(scanner.stats().translated_texts, 1);
        assert_eq!(scanner.stats().editable_texts, 1);
    }

    #[tokio::test]
    async fn test_scan_is_idempotent() {
        let dom = parse_html("<p>a</p><div>b<span>c</span>d</div>");
        let mut scanner = TextScanner::default();
        let first = scanner.scan(&dom.document).await;
        let second = scanner.scan(&dom.document).await;

        let keys = |groups: &[ScannedGroup]| -> Vec<(usize, Vec<usize>)> {
            groups
                .iter()
                .map(|g| (node_key(&g.container), g.text_nodes.iter().map(node_key).collect()))
                .collect()
        };
        assert_eq!(keys(&first), keys(&second));
    }

    #[tokio::test]
    async fn test_scan_yields_on_large_documents() {
        let mut html = String::new();
        for i in 0..500 {
            html.push_str(&format!("<p>paragraph {}</p>", i));
        }
        let dom = parse_html(&html);
        let mut scanner = TextScanner::new(ScannerConfig {
            time_slice: Duration::ZERO,
            check_interval: 16,
        });
        let groups = scanner.scan(&dom.document).await;

        assert_eq!(groups.len(), 500);
        assert!(scanner.stats().yields > 0);
    }

    #[tokio::test]
    async fn test_scan_empty_document() {
        let dom = parse_html("");
        let mut scanner = TextScanner::default();
        assert!(scanner.scan(&dom.document).await.is_empty());
    }
}
