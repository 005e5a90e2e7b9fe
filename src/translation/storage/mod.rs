//! 存储模块
//!
//! 页面级键值存储和按页面隔离的翻译缓存。

pub mod cache;
pub mod store;

pub use cache::{fingerprint, CacheStats, PageCache};
pub use store::{CacheStore, MemoryCacheStore};
