//! 批次协调器模块
//!
//! 决定一个条目的文本单元逐条发送还是合并发送，把合并响应拆回单元结果，
//! 合并响应不完整时回退为逐条请求。
//!
//! ## 处理流程
//!
//! 1. 按模型的最大段落数分块
//! 2. 逐单元查询页面缓存，命中的直接完成
//! 3. 剩一个单元时单独请求；多个单元时用 `%%` 拼接成一个 `multi` 请求
//! 4. 合并响应按分隔符拆分并修剪，段数不符或出现空段时整块改为逐条请求
//!
//! 所有块与回退请求并发执行，每次外发调用都经过速率限制器。

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::join_all;

use crate::translation::config::constants;
use crate::translation::core::client::{ContentType, TranslateRequest, TranslationClient};
use crate::translation::core::limiter::RateLimiter;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::PageCache;

/// 一次批量翻译的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    pub from: String,
    pub to: String,
    pub model_id: String,
    pub max_batch_size: usize,
}

/// 待翻译单元：`index` 为条目内的位置，`text` 已去除首尾空白
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRequest {
    pub index: usize,
    pub text: String,
}

/// 单元结果
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Translated { text: String, cached: bool },
    Failed(TranslationError),
}

/// 批次统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub chunks: usize,
    pub cache_hits: usize,
    pub single_requests: usize,
    pub multi_requests: usize,
    pub integrity_failures: usize,
    pub fallback_requests: usize,
    pub failed_units: usize,
}

/// 批次协调器
pub struct BatchCoordinator {
    client: Rc<TranslationClient>,
    limiter: Rc<RateLimiter>,
    cache: Rc<PageCache>,
    stats: RefCell<BatchStats>,
}

impl BatchCoordinator {
    pub fn new(client: Rc<TranslationClient>, limiter: Rc<RateLimiter>, cache: Rc<PageCache>) -> Self {
        Self {
            client,
            limiter,
            cache,
            stats: RefCell::new(BatchStats::default()),
        }
    }

    pub fn limiter(&self) -> &Rc<RateLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> BatchStats {
        self.stats.borrow().clone()
    }

    /// 翻译一组单元，每个单元恰好回调一次 `on_settled`，全部完成后返回
    pub async fn translate_batch(
        &self,
        units: Vec<UnitRequest>,
        ctx: &BatchContext,
        on_settled: &dyn Fn(usize, UnitOutcome),
    ) {
        let chunk_size = ctx.max_batch_size.max(1);
        let chunks: Vec<Vec<UnitRequest>> = units.chunks(chunk_size).map(<[UnitRequest]>::to_vec).collect();
        self.stats.borrow_mut().chunks += chunks.len();

        tracing::debug!(
            target: "ling_translate::translation",
            "批量翻译 {} 个单元，分为 {} 块",
            units.len(),
            chunks.len()
        );

        join_all(chunks.into_iter().map(|chunk| self.translate_chunk(chunk, ctx, on_settled))).await;
    }

    async fn translate_chunk(&self, chunk: Vec<UnitRequest>, ctx: &BatchContext, on_settled: &dyn Fn(usize, UnitOutcome)) {
        let mut combinable = Vec::new();
        let mut singles = Vec::new();

        for unit in chunk {
            if let Some(text) = self.cache.get(&unit.text, &ctx.from, &ctx.to, &ctx.model_id) {
                self.stats.borrow_mut().cache_hits += 1;
                on_settled(unit.index, UnitOutcome::Translated { text, cached: true });
            } else if unit.text.contains(constants::MULTI_SEPARATOR) {
                singles.push(unit);
            } else {
                combinable.push(unit);
            }
        }

        if combinable.len() == 1 {
            singles.append(&mut combinable);
        }

        let single_jobs = join_all(singles.into_iter().map(|unit| self.translate_single(unit, ctx, on_settled, false)));
        let multi_job = self.translate_multi(combinable, ctx, on_settled);
        futures::join!(single_jobs, multi_job);
    }

    async fn translate_single(
        &self,
        unit: UnitRequest,
        ctx: &BatchContext,
        on_settled: &dyn Fn(usize, UnitOutcome),
        fallback: bool,
    ) {
        {
            let mut stats = self.stats.borrow_mut();
            stats.single_requests += 1;
            if fallback {
                stats.fallback_requests += 1;
            }
        }

        let request = TranslateRequest {
            text: unit.text.clone(),
            from: ctx.from.clone(),
            to: ctx.to.clone(),
            content_type: ContentType::Text,
            model_id: ctx.model_id.clone(),
        };

        match self.limiter.enqueue(self.client.translate(request)).await {
            Ok(text) => {
                self.cache.set(&unit.text, &ctx.from, &ctx.to, &ctx.model_id, &text);
                on_settled(unit.index, UnitOutcome::Translated { text, cached: false });
            }
            Err(e) => self.settle_failed(unit.index, e, on_settled),
        }
    }

    async fn translate_multi(&self, units: Vec<UnitRequest>, ctx: &BatchContext, on_settled: &dyn Fn(usize, UnitOutcome)) {
        if units.is_empty() {
            return;
        }
        self.stats.borrow_mut().multi_requests += 1;

        let joined = units
            .iter()
            .map(|unit| unit.text.as_str())
            .collect::<Vec<_>>()
            .join(constants::MULTI_JOINER);
        let request = TranslateRequest {
            text: joined,
            from: ctx.from.clone(),
            to: ctx.to.clone(),
            content_type: ContentType::Multi,
            model_id: ctx.model_id.clone(),
        };

        let response = self.limiter.enqueue(self.client.translate(request)).await;
        let segments = match response.and_then(|text| split_segments(&text, units.len())) {
            Ok(segments) => segments,
            Err(TranslationError::BatchIntegrity(reason)) => {
                self.stats.borrow_mut().integrity_failures += 1;
                tracing::warn!(
                    target: "ling_translate::translation",
                    "合并响应不完整（{}），{} 个单元改为逐条请求",
                    reason,
                    units.len()
                );
                join_all(units.into_iter().map(|unit| self.translate_single(unit, ctx, on_settled, true))).await;
                return;
            }
            Err(e) => {
                for unit in &units {
                    self.settle_failed(unit.index, e.clone(), on_settled);
                }
                return;
            }
        };

        for (unit, text) in units.into_iter().zip(segments) {
            self.cache.set(&unit.text, &ctx.from, &ctx.to, &ctx.model_id, &text);
            on_settled(unit.index, UnitOutcome::Translated { text, cached: false });
        }
    }

    fn settle_failed(&self, index: usize, error: TranslationError, on_settled: &dyn Fn(usize, UnitOutcome)) {
        self.stats.borrow_mut().failed_units += 1;
        tracing::debug!(target: "ling_translate::translation", "单元 {} 翻译失败: {}", index, error);
        on_settled(index, UnitOutcome::Failed(error));
    }
}

/// 拆分合并响应；段数不符或出现空段视为完整性失败
pub fn split_segments(text: &str, expected: usize) -> TranslationResult<Vec<String>> {
    let segments: Vec<String> = text
        .split(constants::MULTI_SEPARATOR)
        .map(|segment| segment.trim().to_string())
        .collect();

    if segments.len() != expected {
        return Err(TranslationError::BatchIntegrity(format!(
            "期望 {} 段，实际 {} 段",
            expected,
            segments.len()
        )));
    }
    if let Some(position) = segments.iter().position(String::is_empty) {
        return Err(TranslationError::BatchIntegrity(format!("第 {} 段为空", position + 1)));
    }
    Ok(segments)
}
