//! 页面翻译缓存模块
//!
//! 以 (文本, 源语言, 目标语言, 模型) 的指纹为键，按页面 URL 隔离。
//! 缓存只是性能优化，写入失败不会影响翻译流程。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use sha2::{Digest, Sha256};

use super::store::CacheStore;
use crate::translation::config::constants;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub write_failures: u64,
}

/// 页面缓存网关
pub struct PageCache {
    store: Rc<dyn CacheStore>,
    page_url: RefCell<String>,
    hits: Cell<u64>,
    misses: Cell<u64>,
    write_failures: Cell<u64>,
}

// ============================================================================
// 实现
// ============================================================================

impl PageCache {
    /// 创建页面缓存；使用前需调用 `init`
    pub fn new(store: Rc<dyn CacheStore>, page_url: impl Into<String>) -> Self {
        Self {
            store,
            page_url: RefCell::new(page_url.into()),
            hits: Cell::new(0),
            misses: Cell::new(0),
            write_failures: Cell::new(0),
        }
    }

    pub fn page_url(&self) -> String {
        self.page_url.borrow().clone()
    }

    /// 页面加载时调用：清除该 URL 上一次加载留下的条目并重置计数
    pub fn init(&self) -> usize {
        let scope = self.scope_prefix();
        let stale: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&scope))
            .collect();

        for key in &stale {
            self.store.remove(key);
        }

        self.hits.set(0);
        self.misses.set(0);
        self.write_failures.set(0);

        if !stale.is_empty() {
            tracing::debug!("清除页面旧缓存 {} 条: {}", stale.len(), self.page_url.borrow());
        }
        stale.len()
    }

    /// 切换到新的页面 URL 并重新初始化
    pub fn navigate(&self, page_url: impl Into<String>) -> usize {
        *self.page_url.borrow_mut() = page_url.into();
        self.init()
    }

    /// 完整的存储键
    pub fn cache_key(&self, text: &str, from: &str, to: &str, model_id: &str) -> String {
        format!("{}{}", self.scope_prefix(), fingerprint(text, from, to, model_id))
    }

    /// 查询缓存
    pub fn get(&self, text: &str, from: &str, to: &str, model_id: &str) -> Option<String> {
        let key = self.cache_key(text, from, to, model_id);
        match self.store.get(&key) {
            Some(value) => {
                self.hits.set(self.hits.get() + 1);
                Some(value)
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// 写入缓存，失败只记录警告
    pub fn set(&self, text: &str, from: &str, to: &str, model_id: &str, translated: &str) {
        let key = self.cache_key(text, from, to, model_id);
        if let Err(e) = self.store.set(&key, translated) {
            self.write_failures.set(self.write_failures.get() + 1);
            tracing::warn!("写入页面缓存失败，已忽略: {}", e);
        }
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            write_failures: self.write_failures.get(),
        }
    }

    fn scope_prefix(&self) -> String {
        format!("{}{}::", constants::PAGE_CACHE_PREFIX, self.page_url.borrow())
    }
}

/// 内容指纹：每个字段带长度前缀后做 SHA-256
pub fn fingerprint(text: &str, from: &str, to: &str, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [text, from, to, model_id] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests() == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests() as f64
        }
    }

    /// 百分比形式，如 "66.7%"
    pub fn rate(&self) -> String {
        format!("{:.1}%", self.hit_rate() * 100.0)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "命中 {} / 未命中 {} ({})", self.hits, self.misses, self.rate())
    }
}
