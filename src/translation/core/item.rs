//! 翻译条目模型与状态转换
//!
//! 条目状态机 `idle -> pending -> translating -> {success | error}`，重试时
//! `translating -> pending`。转换函数是纯函数，副作用以具名动作返回，由编排器执行。
//!
//! 首次激活不会停留在 `pending`：`Activate` 在同一步内把 `idle` 推进到
//! `translating`（排队与发请求都由 `Dispatch` 完成）。`pending` 只表示等待重试定时器。

use std::time::Duration;

use markup5ever_rcdom::Handle;

use super::run::RunToken;
use crate::parsers::html::dom::{get_node_attr, get_text, NodeRef};
use crate::translation::config::{constants, EngineSettings};

pub type ItemId = usize;

/// 单个文本单元状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Pending,
    Translating,
    Success,
    Error,
}

/// 条目聚合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Idle,
    Pending,
    Translating,
    Success,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Error)
    }
}

/// 一个文本节点
#[derive(Debug, Clone)]
pub struct TranslatableUnit {
    pub node: NodeRef,
    /// 发现时的原始文本（含首尾空白），之后不再改写
    pub original_text: String,
    pub leading: String,
    pub trailing: String,
    pub status: UnitStatus,
    pub translated_text: Option<String>,
    pub last_error: Option<String>,
}

impl TranslatableUnit {
    pub fn new(node: &Handle) -> Self {
        let original_text = get_text(node).unwrap_or_default();
        let trimmed_start = original_text.trim_start();
        let leading = original_text[..original_text.len() - trimmed_start.len()].to_string();
        let trailing = trimmed_start[trimmed_start.trim_end().len()..].to_string();

        Self {
            node: NodeRef::new(node),
            original_text,
            leading,
            trailing,
            status: UnitStatus::Pending,
            translated_text: None,
            last_error: None,
        }
    }

    /// 发送给后端的文本
    pub fn source_text(&self) -> &str {
        self.original_text.trim()
    }

    /// 译文加回原有的首尾空白
    pub fn render(&self, translated: &str) -> String {
        format!("{}{}{}", self.leading, translated, self.trailing)
    }

    pub fn needs_translation(&self) -> bool {
        self.status != UnitStatus::Success
    }
}

/// 一个容器元素及其文本单元
#[derive(Debug, Clone)]
pub struct TranslationItem {
    pub id: ItemId,
    pub element: NodeRef,
    pub units: Vec<TranslatableUnit>,
    pub status: ItemStatus,
    pub retry_count: u32,
    /// 正在等待重试定时器，只能由 `RetryDue` 重新进入
    pub awaiting_retry: bool,
    pub run: RunToken,
    pub original_title: Option<String>,
    pub original_class: Option<String>,
    pub visible: bool,
    pub failure: Option<String>,
}

impl TranslationItem {
    pub fn new(id: ItemId, element: &Handle, text_nodes: &[Handle], run: RunToken) -> Self {
        Self {
            id,
            element: NodeRef::new(element),
            units: text_nodes.iter().map(TranslatableUnit::new).collect(),
            status: ItemStatus::Idle,
            retry_count: 0,
            awaiting_retry: false,
            run,
            original_title: get_node_attr(element, constants::ATTR_TITLE),
            original_class: get_node_attr(element, constants::ATTR_CLASS),
            visible: false,
            failure: None,
        }
    }

    pub fn all_units_succeeded(&self) -> bool {
        !self.units.is_empty() && self.units.iter().all(|unit| unit.status == UnitStatus::Success)
    }

    /// 原文摘要，成功后写入提示属性
    pub fn original_summary(&self) -> String {
        self.units
            .iter()
            .map(TranslatableUnit::source_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn state(&self) -> ItemState {
        ItemState {
            status: self.status,
            retry_count: self.retry_count,
            awaiting_retry: self.awaiting_retry,
        }
    }

    pub fn apply_state(&mut self, state: ItemState) {
        self.status = state.status;
        self.retry_count = state.retry_count;
        self.awaiting_retry = state.awaiting_retry;
    }
}

// ============================================================================
// 状态转换
// ============================================================================

/// 重试策略：`backoff(n) = base × min(n, cap)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(constants::DEFAULT_BACKOFF_BASE_MS),
            backoff_cap: constants::DEFAULT_BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    pub fn from_engine(engine: &EngineSettings) -> Self {
        Self {
            max_attempts: engine.max_attempts.max(1),
            backoff_base: Duration::from_millis(engine.backoff_base_ms),
            backoff_cap: engine.backoff_cap.max(1),
        }
    }

    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.backoff_base * retry_count.min(self.backoff_cap)
    }
}

/// 一次尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    ChannelInvalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// 可见性调度器或启动时激活
    Activate,
    /// 重试定时器到期
    RetryDue,
    AttemptFinished(AttemptOutcome),
    /// 页面通道已失效，不再发请求
    Halt,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    ApplyLoading,
    Dispatch,
    ClearLoading,
    MarkTranslated,
    RestoreErrored,
    RestoreAll,
    MarkFailed,
    ScheduleRetry(Duration),
    NotifyChannelInvalidated,
    RollBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemState {
    pub status: ItemStatus,
    pub retry_count: u32,
    pub awaiting_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ItemState,
    pub actions: Vec<ItemAction>,
}

impl Transition {
    fn stay(state: ItemState) -> Self {
        Self {
            state,
            actions: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 状态转换；`idle + Activate` 直接得到 `translating`，不经过 `pending`
pub fn transition(state: ItemState, event: ItemEvent, policy: &RetryPolicy) -> Transition {
    use ItemAction::*;

    let start = |state: ItemState| Transition {
        state: ItemState {
            status: ItemStatus::Translating,
            awaiting_retry: false,
            ..state
        },
        actions: vec![ApplyLoading, Dispatch],
    };

    match (state.status, event) {
        (_, ItemEvent::Cancel) => Transition {
            state: ItemState {
                status: ItemStatus::Idle,
                awaiting_retry: false,
                ..state
            },
            actions: vec![RollBack],
        },

        (ItemStatus::Idle, ItemEvent::Activate) => start(state),
        (ItemStatus::Pending, ItemEvent::Activate) if !state.awaiting_retry => start(state),
        (ItemStatus::Pending, ItemEvent::RetryDue) if state.awaiting_retry => start(state),

        (ItemStatus::Translating, ItemEvent::AttemptFinished(AttemptOutcome::Succeeded)) => Transition {
            state: ItemState {
                status: ItemStatus::Success,
                ..state
            },
            actions: vec![ClearLoading, MarkTranslated],
        },

        (ItemStatus::Translating, ItemEvent::AttemptFinished(AttemptOutcome::Failed)) => {
            let retry_count = state.retry_count + 1;
            if retry_count < policy.max_attempts {
                Transition {
                    state: ItemState {
                        status: ItemStatus::Pending,
                        retry_count,
                        awaiting_retry: true,
                    },
                    actions: vec![ClearLoading, RestoreErrored, ScheduleRetry(policy.backoff(retry_count))],
                }
            } else {
                Transition {
                    state: ItemState {
                        status: ItemStatus::Error,
                        retry_count,
                        awaiting_retry: false,
                    },
                    actions: vec![ClearLoading, RestoreAll, MarkFailed],
                }
            }
        }

        (ItemStatus::Translating, ItemEvent::AttemptFinished(AttemptOutcome::ChannelInvalidated)) => Transition {
            state: ItemState {
                status: ItemStatus::Error,
                awaiting_retry: false,
                ..state
            },
            actions: vec![ClearLoading, RestoreAll, MarkFailed, NotifyChannelInvalidated],
        },

        (status, ItemEvent::Halt) if !status.is_terminal() => Transition {
            state: ItemState {
                status: ItemStatus::Error,
                awaiting_retry: false,
                ..state
            },
            actions: vec![ClearLoading, RestoreAll, MarkFailed],
        },

        _ => Transition::stay(state),
    }
}
