//! 运行控制器
//!
//! 一次运行 = 一次用户触发的整页翻译。启动时扫描文档、构建条目并接上可见性调度；
//! 取消时令旧运行的令牌失效并回滚全部条目。运行已开启时再次启动等同于关闭。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::Handle;

use super::client::{TranslationBackend, TranslationClient};
use super::item::{RetryPolicy, TranslationItem};
use super::limiter::LimiterRegistry;
use super::markers::DomMarkers;
use super::orchestrator::{InFlight, Orchestrator, OrchestratorConfig, PageState};
use super::visibility::{VisibilityChange, VisibilityScheduler, Viewport};
use crate::translation::config::{SettingsProvider, UserSettings};
use crate::translation::error::{helpers, TranslationResult};
use crate::translation::pipeline::batch::BatchCoordinator;
use crate::translation::pipeline::scanner::{ScannerConfig, TextScanner};
use crate::translation::storage::{CacheStats, PageCache};

// ============================================================================
// 运行令牌
// ============================================================================

/// 运行代数计数器
#[derive(Debug, Clone, Default)]
pub struct RunGeneration(Rc<Cell<u64>>);

/// 某一代运行的令牌，代数变化后即过期
#[derive(Debug, Clone)]
pub struct RunToken {
    generation: u64,
    current: Rc<Cell<u64>>,
}

impl RunGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.get()
    }

    pub fn token(&self) -> RunToken {
        RunToken {
            generation: self.0.get(),
            current: self.0.clone(),
        }
    }

    /// 进入下一代，之前的令牌全部过期
    pub fn bump(&self) -> RunToken {
        self.0.set(self.0.get() + 1);
        self.token()
    }
}

impl RunToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.get() == self.generation
    }
}

// ============================================================================
// 宿主界面
// ============================================================================

/// 宿主提供的用户界面能力
pub trait HostUi {
    /// 页面内一次性提示
    fn notify(&self, message: &str);

    /// 询问是否打开设置页
    fn confirm_open_settings(&self, message: &str) -> bool;

    fn open_settings(&self);
}

/// 只写日志的界面
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUi;

impl HostUi for LogUi {
    fn notify(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn confirm_open_settings(&self, message: &str) -> bool {
        tracing::error!("{}，请先完成配置", message);
        false
    }

    fn open_settings(&self) {
        tracing::info!("请打开设置页完成配置");
    }
}

// ============================================================================
// 运行控制器
// ============================================================================

/// 启动结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { items: usize, activated: usize },
    /// 运行已开启，本次调用关闭了它
    ToggledOff,
    /// 扫描期间被取消
    Superseded,
}

struct ActiveRun {
    orchestrator: Rc<Orchestrator>,
    scheduler: VisibilityScheduler,
}

pub struct RunController {
    document: Handle,
    settings: Rc<dyn SettingsProvider>,
    client: Rc<TranslationClient>,
    cache: Rc<PageCache>,
    limiters: Rc<LimiterRegistry>,
    ui: Rc<dyn HostUi>,
    generation: RunGeneration,
    enabled: Cell<bool>,
    page: Rc<PageState>,
    in_flight: Rc<InFlight>,
    active: RefCell<Option<ActiveRun>>,
}

impl RunController {
    /// 创建控制器并初始化页面缓存
    pub fn new(
        document: Handle,
        settings: Rc<dyn SettingsProvider>,
        backend: Rc<dyn TranslationBackend>,
        cache: Rc<PageCache>,
        limiters: Rc<LimiterRegistry>,
        ui: Rc<dyn HostUi>,
    ) -> Rc<Self> {
        cache.init();
        Rc::new(Self {
            document,
            settings,
            client: Rc::new(TranslationClient::new(backend)),
            cache,
            limiters,
            ui,
            generation: RunGeneration::new(),
            enabled: Cell::new(false),
            page: Rc::new(PageState::new()),
            in_flight: Rc::new(InFlight::new()),
            active: RefCell::new(None),
        })
    }

    /// 订阅设置变更，实时更新限速
    pub fn watch_settings(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.settings.on_settings_changed(Box::new(move |settings| {
            if let Some(controller) = weak.upgrade() {
                controller.apply_settings(settings);
            }
        }));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn page_state(&self) -> &PageState {
        &self.page
    }

    pub fn orchestrator(&self) -> Option<Rc<Orchestrator>> {
        self.active.borrow().as_ref().map(|run| run.orchestrator.clone())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// 外部入口：开启或关闭翻译
    pub async fn toggle(&self, viewport: &dyn Viewport) -> TranslationResult<StartOutcome> {
        self.start(viewport).await
    }

    /// 启动一次运行；已开启时关闭
    pub async fn start(&self, viewport: &dyn Viewport) -> TranslationResult<StartOutcome> {
        if self.enabled.get() {
            self.cancel();
            return Ok(StartOutcome::ToggledOff);
        }

        let settings = self.settings.get_settings().await;
        let model = match settings.require_model() {
            Ok((_, model)) => model.clone(),
            Err(e) => {
                helpers::log_error(&e);
                if self.ui.confirm_open_settings(&e.message()) {
                    self.ui.open_settings();
                }
                return Err(e);
            }
        };

        let token = self.generation.bump();
        self.enabled.set(true);
        if let Some(previous) = self.active.borrow_mut().take() {
            previous.scheduler.disconnect();
        }

        let limits = model.limits();
        let limiter = self.limiters.limiter_for(&settings.default_model_id, limits);

        let mut scanner = TextScanner::new(ScannerConfig {
            time_slice: Duration::from_millis(settings.engine.scan_slice_ms),
            ..ScannerConfig::default()
        });
        let groups = scanner.scan(&self.document).await;
        if !token.is_current() {
            tracing::debug!(target: "ling_translate::dom", "扫描期间运行已取消");
            return Ok(StartOutcome::Superseded);
        }

        let items: Vec<TranslationItem> = groups
            .iter()
            .enumerate()
            .map(|(id, group)| TranslationItem::new(id, &group.container, &group.text_nodes, token.clone()))
            .collect();
        let containers: Vec<Handle> = groups.into_iter().map(|group| group.container).collect();

        let config = OrchestratorConfig {
            from: settings.default_from_lang.clone(),
            to: settings.default_to_lang.clone(),
            model_id: settings.default_model_id.clone(),
            max_batch_size: limits.max_batch_size,
            policy: RetryPolicy::from_engine(&settings.engine),
            min_loading: Duration::from_millis(settings.engine.min_loading_ms),
        };
        let orchestrator = Rc::new(Orchestrator::new(
            token.clone(),
            items,
            DomMarkers::new(self.document.clone(), settings.loading_style()),
            BatchCoordinator::new(self.client.clone(), limiter, self.cache.clone()),
            config,
            self.page.clone(),
            self.ui.clone(),
            self.in_flight.clone(),
        ));

        let scheduler = VisibilityScheduler::new(settings.engine.lookahead_px);
        let mut visible_now = Vec::new();
        for (id, container) in containers.iter().enumerate() {
            if viewport.intersects(container, 0) {
                visible_now.push(id);
            } else {
                scheduler.observe(id, container);
            }
        }

        let deferred = scheduler.observed_count();
        *self.active.borrow_mut() = Some(ActiveRun {
            orchestrator: orchestrator.clone(),
            scheduler,
        });

        tracing::info!(
            "开始翻译运行 #{}: {} 个条目（{} 个立即翻译，{} 个等待进入视口），{} -> {}，模型 {}",
            token.generation(),
            containers.len(),
            visible_now.len(),
            deferred,
            settings.default_from_lang,
            settings.default_to_lang,
            settings.default_model_id
        );

        for &id in &visible_now {
            orchestrator.set_visible(id, true);
            orchestrator.activate(id);
        }

        Ok(StartOutcome::Started {
            items: containers.len(),
            activated: visible_now.len(),
        })
    }

    /// 取消当前运行并回滚，返回回滚的条目数
    pub fn cancel(&self) -> usize {
        let token = self.generation.bump();
        self.enabled.set(false);

        let Some(run) = self.active.borrow_mut().take() else {
            return 0;
        };
        run.scheduler.disconnect();
        run.orchestrator.cancel_all();

        tracing::info!("已取消翻译运行，进入第 {} 代，回滚 {} 个条目", token.generation(), run.orchestrator.len());
        run.orchestrator.len()
    }

    /// 设置变更：更新所选模型的限速
    pub fn apply_settings(&self, settings: &UserSettings) {
        let Some((_, model)) = settings.selected_model() else {
            return;
        };
        if let Some(limiter) = self.limiters.get(&settings.default_model_id) {
            let limits = model.limits();
            limiter.update_limits(limits.concurrency, limits.requests_per_second);
        }
    }

    /// 等待所有进行中的翻译与重试结束
    pub async fn until_settled(&self) {
        self.in_flight.until_idle().await;
    }

    /// 视口变化（滚动、缩放）后重新计算可见性
    pub fn handle_viewport_change(&self, viewport: &dyn Viewport) -> usize {
        let changes = match self.active.borrow().as_ref() {
            Some(run) => run.scheduler.poll(viewport),
            None => return 0,
        };
        self.apply_visibility(changes)
    }

    /// 宿主转发的交叉通知
    pub fn intersection_changed(&self, element: &Handle, intersecting: bool) -> usize {
        let change = match self.active.borrow().as_ref() {
            Some(run) => run.scheduler.intersection_changed(element, intersecting),
            None => return 0,
        };
        self.apply_visibility(change.into_iter().collect())
    }

    fn apply_visibility(&self, changes: Vec<VisibilityChange>) -> usize {
        let Some(orchestrator) = self.orchestrator() else {
            return 0;
        };

        let mut activated = 0;
        for change in changes {
            orchestrator.set_visible(change.item, change.visible);
            if change.visible && orchestrator.is_activatable(change.item) {
                orchestrator.activate(change.item);
                activated += 1;
            }
        }
        if activated > 0 {
            tracing::debug!(target: "ling_translate::dom", "{} 个条目进入视口", activated);
        }
        activated
    }
}
