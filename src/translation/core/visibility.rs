//! 可见性调度器
//!
//! 模拟交叉观察器：宿主通过 [`Viewport`] 描述当前视口，或直接转发交叉通知。
//! 调度器只产出可见性变化，由运行控制器决定是否激活条目。

use std::cell::{Cell, RefCell};

use markup5ever_rcdom::Handle;

use super::item::ItemId;
use crate::parsers::html::dom::NodeRef;

/// 视口
pub trait Viewport {
    /// 元素是否与（向外扩展 `margin_px` 后的）视口相交
    fn intersects(&self, element: &Handle, margin_px: u32) -> bool;
}

/// 整页可见，用于离线处理
#[derive(Debug, Clone, Copy, Default)]
pub struct FullPageViewport;

impl Viewport for FullPageViewport {
    fn intersects(&self, _element: &Handle, _margin_px: u32) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityChange {
    pub item: ItemId,
    pub visible: bool,
}

struct Observed {
    item: ItemId,
    element: NodeRef,
    last: Option<bool>,
}

pub struct VisibilityScheduler {
    margin_px: u32,
    observed: RefCell<Vec<Observed>>,
    connected: Cell<bool>,
}

impl VisibilityScheduler {
    pub fn new(margin_px: u32) -> Self {
        Self {
            margin_px,
            observed: RefCell::new(Vec::new()),
            connected: Cell::new(true),
        }
    }

    pub fn margin_px(&self) -> u32 {
        self.margin_px
    }

    pub fn observe(&self, item: ItemId, element: &Handle) {
        if !self.connected.get() {
            return;
        }
        self.observed.borrow_mut().push(Observed {
            item,
            element: NodeRef::new(element),
            last: None,
        });
    }

    /// 停止观察所有元素，之后的通知全部忽略
    pub fn disconnect(&self) {
        self.connected.set(false);
        self.observed.borrow_mut().clear();
    }

    pub fn observed_count(&self) -> usize {
        self.observed.borrow().len()
    }

    /// 转发一条交叉通知
    pub fn intersection_changed(&self, element: &Handle, intersecting: bool) -> Option<VisibilityChange> {
        if !self.connected.get() {
            return None;
        }
        let mut observed = self.observed.borrow_mut();
        let entry = observed.iter_mut().find(|entry| entry.element.is(element))?;
        if entry.last == Some(intersecting) {
            return None;
        }
        entry.last = Some(intersecting);
        Some(VisibilityChange {
            item: entry.item,
            visible: intersecting,
        })
    }

    /// 按当前视口重新计算，返回状态发生变化的条目
    pub fn poll(&self, viewport: &dyn Viewport) -> Vec<VisibilityChange> {
        if !self.connected.get() {
            return Vec::new();
        }
        let mut changes = Vec::new();
        for entry in self.observed.borrow_mut().iter_mut() {
            let Some(element) = entry.element.upgrade() else {
                continue;
            };
            let now = viewport.intersects(&element, self.margin_px);
            if entry.last != Some(now) {
                entry.last = Some(now);
                changes.push(VisibilityChange {
                    item: entry.item,
                    visible: now,
                });
            }
        }
        changes
    }
}
