// 集成测试公共模块
//
// 脚本化后端、记录型界面、视口与页面夹具

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use markup5ever_rcdom::{Handle, RcDom};

use ling_translate::parsers::html::dom::{find_body, get_node_attr, get_node_name, get_text, node_key, parse_html};
use ling_translate::parsers::html::serializer::serialize_node;
use ling_translate::translation::config::{constants, ApiConfig, ModelConfig, StaticSettings, UserSettings};
use ling_translate::translation::core::{
    ContentType, HostUi, LimiterRegistry, RunController, TranslateRequest, TranslateResponse, TranslationBackend,
    Viewport,
};
use ling_translate::translation::error::{TranslationError, TranslationResult};
use ling_translate::translation::storage::{MemoryCacheStore, PageCache};

pub const MODEL_ID: &str = "mock:echo";
pub const PAGE_URL: &str = "https://example.com/article";

/// 可解析到 mock 模型的设置
pub fn test_settings() -> UserSettings {
    UserSettings {
        default_to_lang: "zh-CN".to_string(),
        default_model_id: MODEL_ID.to_string(),
        api_configs: vec![ApiConfig {
            id: "mock".to_string(),
            name: "Mock".to_string(),
            base_url: "https://mock.invalid/v1".to_string(),
            api_key: "sk-test".to_string(),
            models: vec![ModelConfig {
                id: "echo".to_string(),
                name: "echo-model".to_string(),
                concurrency: Some(4),
                requests_per_second: Some(100),
                ..Default::default()
            }],
        }],
        ..Default::default()
    }
    .migrated()
}

/// 后端行为
#[derive(Debug, Clone, PartialEq)]
pub enum MockMode {
    /// 查词典，查不到时返回 `[to] text`
    Translate,
    /// 服务端返回失败
    FailService(String),
    /// 传输层失败
    Transport(String),
    /// 合并请求只返回一段
    BreakMulti,
}

/// 脚本化翻译后端
pub struct MockBackend {
    mode: RefCell<MockMode>,
    fail_remaining: Cell<usize>,
    dictionary: HashMap<String, String>,
    delay: Cell<Duration>,
    calls: RefCell<Vec<TranslateRequest>>,
}

impl MockBackend {
    pub fn new() -> Rc<Self> {
        Self::with_entries(&[])
    }

    pub fn with_entries(entries: &[(&str, &str)]) -> Rc<Self> {
        Rc::new(Self {
            mode: RefCell::new(MockMode::Translate),
            fail_remaining: Cell::new(0),
            dictionary: entries
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            delay: Cell::new(Duration::ZERO),
            calls: RefCell::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.borrow_mut() = mode;
    }

    /// 接下来 n 次调用返回服务端失败
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.set(n);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay.set(delay);
    }

    pub fn calls(&self) -> Vec<TranslateRequest> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn translate_text(&self, text: &str, to: &str) -> String {
        self.dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", to, text))
    }

    fn reply(&self, request: &TranslateRequest) -> TranslationResult<TranslateResponse> {
        if self.fail_remaining.get() > 0 {
            self.fail_remaining.set(self.fail_remaining.get() - 1);
            return Ok(TranslateResponse::failed("temporarily unavailable"));
        }

        match self.mode.borrow().clone() {
            MockMode::FailService(message) => Ok(TranslateResponse::failed(message)),
            MockMode::Transport(message) => Err(TranslationError::NetworkError(message)),
            MockMode::BreakMulti if request.content_type == ContentType::Multi => {
                Ok(TranslateResponse::ok("only one segment"))
            }
            MockMode::Translate | MockMode::BreakMulti => {
                let text = match request.content_type {
                    ContentType::Text => self.translate_text(&request.text, &request.to),
                    ContentType::Multi => request
                        .text
                        .split(constants::MULTI_JOINER)
                        .map(|segment| self.translate_text(segment, &request.to))
                        .collect::<Vec<_>>()
                        .join(constants::MULTI_JOINER),
                };
                Ok(TranslateResponse::ok(text))
            }
        }
    }
}

impl TranslationBackend for MockBackend {
    fn translate(&self, request: TranslateRequest) -> LocalBoxFuture<'_, TranslationResult<TranslateResponse>> {
        Box::pin(async move {
            self.calls.borrow_mut().push(request.clone());
            let delay = self.delay.get();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.reply(&request)
        })
    }
}

/// 记录所有提示的界面
#[derive(Default)]
pub struct RecordingUi {
    pub notices: RefCell<Vec<String>>,
    pub prompts: RefCell<Vec<String>>,
    pub accept_settings_prompt: Cell<bool>,
    pub settings_opened: Cell<usize>,
}

impl HostUi for RecordingUi {
    fn notify(&self, message: &str) {
        self.notices.borrow_mut().push(message.to_string());
    }

    fn confirm_open_settings(&self, message: &str) -> bool {
        self.prompts.borrow_mut().push(message.to_string());
        self.accept_settings_prompt.get()
    }

    fn open_settings(&self) {
        self.settings_opened.set(self.settings_opened.get() + 1);
    }
}

/// 显式列出可见元素的视口
#[derive(Default)]
pub struct SetViewport {
    visible: RefCell<HashSet<usize>>,
}

impl SetViewport {
    pub fn showing(elements: &[Handle]) -> Self {
        let viewport = Self::default();
        for element in elements {
            viewport.show(element);
        }
        viewport
    }

    pub fn show(&self, element: &Handle) {
        self.visible.borrow_mut().insert(node_key(element));
    }
}

impl Viewport for SetViewport {
    fn intersects(&self, element: &Handle, _margin_px: u32) -> bool {
        self.visible.borrow().contains(&node_key(element))
    }
}

/// 一个页面及其控制器
pub struct TestPage {
    pub dom: RcDom,
    pub backend: Rc<MockBackend>,
    pub settings: Rc<StaticSettings>,
    pub store: Rc<MemoryCacheStore>,
    pub ui: Rc<RecordingUi>,
    pub limiters: Rc<LimiterRegistry>,
    pub controller: Rc<RunController>,
}

impl TestPage {
    pub fn new(html: &str) -> Self {
        Self::build(html, test_settings(), MockBackend::new(), Rc::new(MemoryCacheStore::new()))
    }

    pub fn build(html: &str, settings: UserSettings, backend: Rc<MockBackend>, store: Rc<MemoryCacheStore>) -> Self {
        let dom = parse_html(html);
        let settings = Rc::new(StaticSettings::new(settings));
        let ui = Rc::new(RecordingUi::default());
        let limiters = Rc::new(LimiterRegistry::new());
        let controller = RunController::new(
            dom.document.clone(),
            settings.clone(),
            backend.clone(),
            Rc::new(PageCache::new(store.clone(), PAGE_URL)),
            limiters.clone(),
            ui.clone(),
        );

        Self {
            dom,
            backend,
            settings,
            store,
            ui,
            limiters,
            controller,
        }
    }

    /// 整个文档的序列化结果
    pub fn html(&self) -> String {
        serialize_node(&self.dom.document).unwrap()
    }

    pub fn body_html(&self) -> String {
        serialize_node(&find_body(&self.dom.document).unwrap()).unwrap()
    }

    /// 按标签名查找元素（文档顺序）
    pub fn elements(&self, tag: &str) -> Vec<Handle> {
        let mut found = Vec::new();
        collect_elements(&self.dom.document, tag, &mut found);
        found
    }

    pub fn element(&self, tag: &str, index: usize) -> Handle {
        self.elements(tag).swap_remove(index)
    }
}

fn collect_elements(node: &Handle, tag: &str, found: &mut Vec<Handle>) {
    if get_node_name(node) == Some(tag) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, tag, found);
    }
}

/// 元素下所有文本节点拼接
pub fn text_of(element: &Handle) -> String {
    let mut text = String::new();
    for child in element.children.borrow().iter() {
        match get_text(child) {
            Some(content) => text.push_str(&content),
            None => text.push_str(&text_of(child)),
        }
    }
    text
}

pub fn attr(element: &Handle, name: &str) -> Option<String> {
    get_node_attr(element, name)
}
