//! 速率限制器
//!
//! 每个模型一个限制器：同时进行的请求数不超过并发上限，相邻两次发起之间至少间隔
//! `1000 / rps` 毫秒。等待者严格按入队顺序放行。
//!
//! 运行在单线程协作调度之上，状态放在 `RefCell` 里，只在挂起点之间修改。

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::translation::config::ModelLimits;

// ============================================================================
// 核心类型
// ============================================================================

/// 限制器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub concurrency: u32,
    pub requests_per_second: u32,
    pub active: u32,
    pub queued: usize,
    pub started: u64,
    pub peak_active: u32,
}

struct LimiterState {
    concurrency: u32,
    requests_per_second: u32,
    active: u32,
    next_available: Instant,
    queue: VecDeque<u64>,
    next_ticket: u64,
    started: u64,
    peak_active: u32,
}

/// 速率限制器
pub struct RateLimiter {
    state: RefCell<LimiterState>,
    notify: Notify,
}

/// 占用的并发名额，释放时唤醒队首
pub struct Permit<'a> {
    limiter: &'a RateLimiter,
}

/// 尚未放行的排队票据；等待方被丢弃时自动出队
struct Ticket<'a> {
    limiter: &'a RateLimiter,
    id: u64,
    queued: bool,
}

// ============================================================================
// 实现
// ============================================================================

impl RateLimiter {
    pub fn new(concurrency: u32, requests_per_second: u32) -> Self {
        Self {
            state: RefCell::new(LimiterState {
                concurrency: concurrency.max(1),
                requests_per_second: requests_per_second.max(1),
                active: 0,
                next_available: Instant::now(),
                queue: VecDeque::new(),
                next_ticket: 0,
                started: 0,
                peak_active: 0,
            }),
            notify: Notify::new(),
        }
    }

    pub fn from_limits(limits: ModelLimits) -> Self {
        Self::new(limits.concurrency, limits.requests_per_second)
    }

    /// 更新限制，立即作用于后续调度，不影响进行中的任务
    pub fn update_limits(&self, concurrency: u32, requests_per_second: u32) {
        {
            let mut state = self.state.borrow_mut();
            state.concurrency = concurrency.max(1);
            state.requests_per_second = requests_per_second.max(1);
        }
        tracing::debug!(
            target: "ling_translate::network",
            "更新速率限制: 并发 {}, 每秒 {} 次",
            concurrency.max(1),
            requests_per_second.max(1)
        );
        self.notify.notify_waiters();
    }

    /// 排队执行任务，返回任务结果
    pub async fn enqueue<F, T>(&self, job: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        job.await
    }

    /// 等待轮到自己并占用一个并发名额
    pub async fn acquire(&self) -> Permit<'_> {
        let mut ticket = self.push_ticket();

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait_until = {
                let mut state = self.state.borrow_mut();
                if state.queue.front() != Some(&ticket.id) || state.active >= state.concurrency {
                    None
                } else {
                    let now = Instant::now();
                    if now >= state.next_available {
                        state.queue.pop_front();
                        state.active += 1;
                        state.started += 1;
                        state.peak_active = state.peak_active.max(state.active);
                        state.next_available = now.max(state.next_available) + interval(state.requests_per_second);
                        ticket.queued = false;
                        drop(state);
                        // 队首变化，下一位重新检查
                        self.notify.notify_waiters();
                        return Permit { limiter: self };
                    }
                    Some(state.next_available)
                }
            };

            match wait_until {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.state.borrow();
        LimiterSnapshot {
            concurrency: state.concurrency,
            requests_per_second: state.requests_per_second,
            active: state.active,
            queued: state.queue.len(),
            started: state.started,
            peak_active: state.peak_active,
        }
    }

    fn push_ticket(&self) -> Ticket<'_> {
        let mut state = self.state.borrow_mut();
        let id = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(id);
        Ticket {
            limiter: self,
            id,
            queued: true,
        }
    }

    fn release(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.active = state.active.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }
}

fn interval(requests_per_second: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(requests_per_second.max(1)))
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.queued {
            return;
        }
        let was_head = {
            let mut state = self.limiter.state.borrow_mut();
            let was_head = state.queue.front() == Some(&self.id);
            state.queue.retain(|id| *id != self.id);
            was_head
        };
        if was_head {
            self.limiter.notify.notify_waiters();
        }
    }
}

/// 按模型键共享的限制器注册表，跨运行保留
#[derive(Default)]
pub struct LimiterRegistry {
    limiters: RefCell<HashMap<String, Rc<RateLimiter>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取模型对应的限制器，不存在则创建，已存在则更新限制
    pub fn limiter_for(&self, model_key: &str, limits: ModelLimits) -> Rc<RateLimiter> {
        let mut limiters = self.limiters.borrow_mut();
        if let Some(limiter) = limiters.get(model_key) {
            limiter.update_limits(limits.concurrency, limits.requests_per_second);
            return limiter.clone();
        }

        tracing::debug!(
            target: "ling_translate::network",
            "创建速率限制器 {}: 并发 {}, 每秒 {} 次",
            model_key,
            limits.concurrency,
            limits.requests_per_second
        );
        let limiter = Rc::new(RateLimiter::from_limits(limits));
        limiters.insert(model_key.to_string(), limiter.clone());
        limiter
    }

    pub fn get(&self, model_key: &str) -> Option<Rc<RateLimiter>> {
        self.limiters.borrow().get(model_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.limiters.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.borrow().is_empty()
    }
}
