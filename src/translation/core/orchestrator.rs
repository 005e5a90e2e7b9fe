//! 翻译编排器
//!
//! 负责条目从激活到成功或失败的全过程：加载指示、缓存与批量翻译、
//! 逐单元写回、重试与终态标记。状态转换由 [`transition`] 计算，
//! 这里只执行其返回的动作。
//!
//! 每次挂起恢复后都检查运行令牌，令牌过期时不再修改条目或文档。

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::item::{
    transition, AttemptOutcome, ItemAction, ItemEvent, ItemId, ItemStatus, RetryPolicy, TranslationItem, UnitStatus,
};
use super::markers::DomMarkers;
use super::run::{HostUi, RunToken};
use crate::translation::config::LoadingStyle;
use crate::translation::error::{ErrorStats, TranslationError};
use crate::translation::pipeline::batch::{BatchContext, BatchCoordinator, UnitOutcome, UnitRequest};

/// 通道失效时展示给用户的提示
pub const CHANNEL_INVALIDATED_NOTICE: &str = "翻译扩展已更新或重新加载，请刷新页面后再试";

/// 编排参数
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub from: String,
    pub to: String,
    pub model_id: String,
    pub max_batch_size: usize,
    pub policy: RetryPolicy,
    pub min_loading: Duration,
}

/// 页面级状态，跨运行保留
#[derive(Debug, Default)]
pub struct PageState {
    channel_invalidated: Cell<bool>,
    notice_shown: Cell<bool>,
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_invalidated(&self) -> bool {
        self.channel_invalidated.get()
    }
}

/// 进行中任务计数
#[derive(Debug, Default)]
pub struct InFlight {
    count: Cell<usize>,
    notify: Notify,
}

pub struct InFlightGuard {
    tracker: Rc<InFlight>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(self: &Rc<Self>) -> InFlightGuard {
        self.count.set(self.count.get() + 1);
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    /// 等待计数归零
    pub async fn until_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.tracker.count.get().saturating_sub(1);
        self.tracker.count.set(remaining);
        if remaining == 0 {
            self.tracker.notify.notify_waiters();
        }
    }
}

/// 编排统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub activations: u64,
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries_scheduled: u64,
    pub halted: u64,
    pub stale_drops: u64,
}

#[derive(Default)]
struct StatCells {
    activations: Cell<u64>,
    attempts: Cell<u64>,
    succeeded: Cell<u64>,
    failed: Cell<u64>,
    retries_scheduled: Cell<u64>,
    halted: Cell<u64>,
    stale_drops: Cell<u64>,
}

fn bump(cell: &Cell<u64>) {
    cell.set(cell.get() + 1);
}

/// 翻译编排器，属于一次运行
pub struct Orchestrator {
    run: RunToken,
    items: RefCell<Vec<TranslationItem>>,
    markers: DomMarkers,
    coordinator: BatchCoordinator,
    config: OrchestratorConfig,
    page: Rc<PageState>,
    ui: Rc<dyn HostUi>,
    in_flight: Rc<InFlight>,
    timers: RefCell<Vec<JoinHandle<()>>>,
    stats: StatCells,
    errors: RefCell<ErrorStats>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run: RunToken,
        items: Vec<TranslationItem>,
        markers: DomMarkers,
        coordinator: BatchCoordinator,
        config: OrchestratorConfig,
        page: Rc<PageState>,
        ui: Rc<dyn HostUi>,
        in_flight: Rc<InFlight>,
    ) -> Self {
        Self {
            run,
            items: RefCell::new(items),
            markers,
            coordinator,
            config,
            page,
            ui,
            in_flight,
            timers: RefCell::new(Vec::new()),
            stats: StatCells::default(),
            errors: RefCell::new(ErrorStats::default()),
        }
    }

    pub fn run(&self) -> &RunToken {
        &self.run
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.coordinator
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn status(&self, id: ItemId) -> Option<ItemStatus> {
        self.items.borrow().get(id).map(|item| item.status)
    }

    /// 条目快照
    pub fn item(&self, id: ItemId) -> Option<TranslationItem> {
        self.items.borrow().get(id).cloned()
    }

    /// 条目仍在等待首次翻译
    pub fn is_activatable(&self, id: ItemId) -> bool {
        self.items
            .borrow()
            .get(id)
            .is_some_and(|item| matches!(item.status, ItemStatus::Idle | ItemStatus::Pending) && !item.awaiting_retry)
    }

    pub fn set_visible(&self, id: ItemId, visible: bool) {
        if let Some(item) = self.items.borrow_mut().get_mut(id) {
            item.visible = visible;
        }
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            activations: self.stats.activations.get(),
            attempts: self.stats.attempts.get(),
            succeeded: self.stats.succeeded.get(),
            failed: self.stats.failed.get(),
            retries_scheduled: self.stats.retries_scheduled.get(),
            halted: self.stats.halted.get(),
            stale_drops: self.stats.stale_drops.get(),
        }
    }

    /// 当前运行中各次尝试记录的单元错误
    pub fn error_stats(&self) -> ErrorStats {
        self.errors.borrow().clone()
    }

    /// 激活条目；页面通道已失效时直接终止
    pub fn activate(self: &Rc<Self>, id: ItemId) {
        if self.page.channel_invalidated() {
            self.halt(id);
        } else {
            self.dispatch_event(id, ItemEvent::Activate);
        }
    }

    /// 通道失效后不再发请求，条目以失效提示作为失败原因终止
    fn halt(self: &Rc<Self>, id: ItemId) {
        if let Some(item) = self.items.borrow_mut().get_mut(id) {
            item.failure = Some(CHANNEL_INVALIDATED_NOTICE.to_string());
        }
        self.dispatch_event(id, ItemEvent::Halt);
    }

    /// 回滚所有条目；由运行控制器在令牌失效后调用
    pub fn cancel_all(&self) {
        for timer in self.timers.borrow_mut().drain(..) {
            timer.abort();
        }

        let mut items = self.items.borrow_mut();
        for item in items.iter_mut() {
            let step = transition(item.state(), ItemEvent::Cancel, &self.config.policy);
            item.apply_state(step.state);
            self.markers.roll_back(item);
            for unit in item.units.iter_mut() {
                unit.status = UnitStatus::Pending;
                unit.translated_text = None;
                unit.last_error = None;
            }
            item.failure = None;
        }
        tracing::debug!(target: "ling_translate::dom", "已回滚 {} 个条目", items.len());
    }

    fn dispatch_event(self: &Rc<Self>, id: ItemId, event: ItemEvent) {
        if !self.run.is_current() {
            bump(&self.stats.stale_drops);
            return;
        }

        let step = {
            let mut items = self.items.borrow_mut();
            let Some(item) = items.get_mut(id) else {
                return;
            };
            let step = transition(item.state(), event, &self.config.policy);
            item.apply_state(step.state);
            step
        };

        if step.is_noop() {
            return;
        }
        match event {
            ItemEvent::Activate => bump(&self.stats.activations),
            ItemEvent::Halt => bump(&self.stats.halted),
            _ => {}
        }

        for action in step.actions {
            self.execute(id, action);
        }
    }

    fn execute(self: &Rc<Self>, id: ItemId, action: ItemAction) {
        match action {
            ItemAction::ApplyLoading => {
                let mut items = self.items.borrow_mut();
                if let Some(item) = items.get_mut(id) {
                    for unit in item.units.iter_mut().filter(|unit| unit.needs_translation()) {
                        unit.status = UnitStatus::Translating;
                    }
                    self.markers.apply_loading(item);
                }
            }
            ItemAction::Dispatch => {
                let guard = self.in_flight.enter();
                let this = self.clone();
                tokio::task::spawn_local(async move {
                    let _guard = guard;
                    this.attempt(id).await;
                });
            }
            ItemAction::ClearLoading => self.with_item(id, |markers, item| markers.clear_loading(item)),
            ItemAction::MarkTranslated => {
                bump(&self.stats.succeeded);
                let to = self.config.to.clone();
                self.with_item(id, |markers, item| {
                    markers.mark_translated(item, &to);
                });
                tracing::debug!(target: "ling_translate::translation", "条目 {} 翻译完成", id);
            }
            ItemAction::RestoreErrored => {
                let mut items = self.items.borrow_mut();
                if let Some(item) = items.get_mut(id) {
                    for unit in item.units.iter_mut().filter(|unit| unit.status == UnitStatus::Error) {
                        self.markers.restore_unit(unit);
                        unit.status = UnitStatus::Pending;
                    }
                }
            }
            ItemAction::RestoreAll => {
                let mut items = self.items.borrow_mut();
                if let Some(item) = items.get_mut(id) {
                    for unit in item.units.iter_mut() {
                        self.markers.restore_unit(unit);
                        if unit.status != UnitStatus::Error {
                            unit.status = UnitStatus::Pending;
                        }
                        unit.translated_text = None;
                    }
                }
            }
            ItemAction::MarkFailed => {
                bump(&self.stats.failed);
                self.with_item(id, |markers, item| {
                    let reason = item.failure.clone().unwrap_or_else(|| "翻译失败".to_string());
                    markers.mark_failed(item, &reason);
                    tracing::warn!(
                        target: "ling_translate::translation",
                        "条目 {} 最终失败（尝试 {} 次）: {}",
                        item.id,
                        item.retry_count,
                        reason
                    );
                });
            }
            ItemAction::ScheduleRetry(delay) => {
                bump(&self.stats.retries_scheduled);
                tracing::debug!(target: "ling_translate::translation", "条目 {} 将在 {:?} 后重试", id, delay);
                let guard = self.in_flight.enter();
                let this = self.clone();
                let handle = tokio::task::spawn_local(async move {
                    let _guard = guard;
                    tokio::time::sleep(delay).await;
                    if this.page.channel_invalidated() {
                        this.halt(id);
                    } else {
                        this.dispatch_event(id, ItemEvent::RetryDue);
                    }
                });
                self.timers.borrow_mut().push(handle);
            }
            ItemAction::NotifyChannelInvalidated => {
                self.page.channel_invalidated.set(true);
                if !self.page.notice_shown.replace(true) {
                    self.ui.notify(CHANNEL_INVALIDATED_NOTICE);
                }
            }
            ItemAction::RollBack => self.with_item(id, |markers, item| markers.roll_back(item)),
        }
    }

    fn with_item(&self, id: ItemId, f: impl FnOnce(&DomMarkers, &TranslationItem)) {
        if let Some(item) = self.items.borrow().get(id) {
            f(&self.markers, item);
        }
    }

    /// 一次翻译尝试
    async fn attempt(self: Rc<Self>, id: ItemId) {
        bump(&self.stats.attempts);
        let started = Instant::now();

        let requests: Vec<UnitRequest> = match self.items.borrow().get(id) {
            Some(item) => item
                .units
                .iter()
                .enumerate()
                .filter(|(_, unit)| unit.status == UnitStatus::Translating)
                .map(|(index, unit)| UnitRequest {
                    index,
                    text: unit.source_text().to_string(),
                })
                .collect(),
            None => return,
        };

        let ctx = BatchContext {
            from: self.config.from.clone(),
            to: self.config.to.clone(),
            model_id: self.config.model_id.clone(),
            max_batch_size: self.config.max_batch_size,
        };
        let failures: RefCell<Vec<TranslationError>> = RefCell::new(Vec::new());

        self.coordinator
            .translate_batch(requests, &ctx, &|index, outcome| {
                if !self.run.is_current() {
                    return;
                }
                self.settle_unit(id, index, outcome, &failures);
            })
            .await;

        if self.markers.loading_style() != LoadingStyle::None {
            let elapsed = started.elapsed();
            if elapsed < self.config.min_loading {
                tokio::time::sleep(self.config.min_loading - elapsed).await;
            }
        }

        if !self.run.is_current() {
            bump(&self.stats.stale_drops);
            tracing::debug!(target: "ling_translate::translation", "条目 {} 的结果属于已取消的运行，丢弃", id);
            return;
        }

        let failures = failures.into_inner();
        {
            let mut errors = self.errors.borrow_mut();
            for error in &failures {
                errors.record_error(error);
            }
        }
        let outcome = {
            let mut items = self.items.borrow_mut();
            let Some(item) = items.get_mut(id) else {
                return;
            };
            if let Some(first) = failures.first() {
                item.failure = Some(first.to_string());
            }
            if failures.iter().any(TranslationError::is_channel_invalidated) {
                AttemptOutcome::ChannelInvalidated
            } else if item.all_units_succeeded() {
                AttemptOutcome::Succeeded
            } else {
                AttemptOutcome::Failed
            }
        };

        self.dispatch_event(id, ItemEvent::AttemptFinished(outcome));
    }

    fn settle_unit(&self, id: ItemId, index: usize, outcome: UnitOutcome, failures: &RefCell<Vec<TranslationError>>) {
        let mut items = self.items.borrow_mut();
        let Some(unit) = items.get_mut(id).and_then(|item| item.units.get_mut(index)) else {
            return;
        };

        match outcome {
            UnitOutcome::Translated { text, .. } => {
                if !self.markers.write_translation(unit, &text) {
                    tracing::debug!(target: "ling_translate::dom", "条目 {} 单元 {} 已脱离文档，跳过写入", id, index);
                }
                unit.status = UnitStatus::Success;
                unit.translated_text = Some(text);
                unit.last_error = None;
            }
            UnitOutcome::Failed(error) => {
                unit.status = UnitStatus::Error;
                unit.last_error = Some(error.to_string());
                failures.borrow_mut().push(error);
            }
        }
    }
}
