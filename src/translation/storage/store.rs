//! 页面级键值存储
//!
//! 对应浏览器的会话存储：字符串键值、整体配额，写满时返回错误而不是淘汰旧条目。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::translation::config::constants;
use crate::translation::error::{helpers, TranslationResult};

/// 缓存存储接口
pub trait CacheStore {
    fn get(&self, key: &str) -> Option<String>;

    /// 写入失败（如配额不足）返回 `CacheError`
    fn set(&self, key: &str, value: &str) -> TranslationResult<()>;

    fn remove(&self, key: &str);

    fn keys(&self) -> Vec<String>;
}

/// 内存存储，按键和值的字节数计算配额
pub struct MemoryCacheStore {
    entries: RefCell<HashMap<String, String>>,
    quota_bytes: usize,
    used_bytes: Cell<usize>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_quota(constants::DEFAULT_STORE_QUOTA_BYTES)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            quota_bytes,
            used_bytes: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.get()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> TranslationResult<()> {
        let mut entries = self.entries.borrow_mut();
        let previous = entries.get(key).map_or(0, |old| key.len() + old.len());
        let needed = self.used_bytes.get() - previous + key.len() + value.len();
        if needed > self.quota_bytes {
            return Err(helpers::cache_error(format!(
                "存储配额不足: 需要 {} 字节, 上限 {} 字节",
                needed, self.quota_bytes
            )));
        }

        entries.insert(key.to_string(), value.to_string());
        self.used_bytes.set(needed);
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Some(old) = self.entries.borrow_mut().remove(key) {
            self.used_bytes.set(self.used_bytes.get() - key.len() - old.len());
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::error::TranslationError;

    #[test]
    fn test_store_basic_operations() {
        let store = MemoryCacheStore::new();
        assert!(store.is_empty());
        store.set("a", "1").unwrap();
        store.set("a", "22").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("22"));
        assert_eq!(store.used_bytes(), 3);

        store.remove("a");
        assert_eq!(store.get("a"), None);
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_store_quota() {
        let store = MemoryCacheStore::with_quota(8);
        store.set("key", "12345").unwrap();
        let err = store.set("other", "x").unwrap_err();
        assert!(matches!(err, TranslationError::CacheError(_)));
        assert_eq!(store.len(), 1);

        // 覆盖同一个键时按差值计算
        store.set("key", "54321").unwrap();
    }
}
