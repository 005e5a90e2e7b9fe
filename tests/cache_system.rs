//! 页面缓存集成测试
//!
//! 页面级隔离、重新加载时清除、配额不足时降级、按目标语言区分

use std::rc::Rc;

use tokio::task::LocalSet;

use ling_translate::translation::core::FullPageViewport;
use ling_translate::translation::storage::{CacheStore, MemoryCacheStore, PageCache};

mod common {
    include!("common/mod.rs");
}

use common::{test_settings, text_of, MockBackend, TestPage, MODEL_ID, PAGE_URL};

async fn translate_once(page: &TestPage) {
    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_reload_purges_only_the_current_page() {
    let store = Rc::new(MemoryCacheStore::new());
    let other = PageCache::new(store.clone(), "https://example.com/other");
    other.set("Hello", "auto", "zh-CN", MODEL_ID, "你好");

    let html = "<p>Hello</p><p>World</p>";
    let first = TestPage::build(html, test_settings(), MockBackend::new(), store.clone());
    translate_once(&first).await;
    assert_eq!(first.backend.call_count(), 2);
    assert_eq!(store.len(), 3);

    // 同一 URL 重新加载：上一次的条目被清除，其它页面不受影响
    let reloaded = TestPage::build(html, test_settings(), MockBackend::new(), store.clone());
    assert_eq!(store.len(), 1);
    assert_eq!(other.get("Hello", "auto", "zh-CN", MODEL_ID).as_deref(), Some("你好"));

    translate_once(&reloaded).await;
    assert_eq!(reloaded.backend.call_count(), 2);
    assert_eq!(reloaded.controller.cache_stats().hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entries_are_scoped_by_page_url() {
    let store = Rc::new(MemoryCacheStore::new());
    let page = TestPage::build("<p>Hello</p>", test_settings(), MockBackend::new(), store.clone());
    translate_once(&page).await;

    let prefix = format!("ling_page_cache_{}::", PAGE_URL);
    let keys = store.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with(&prefix));
    assert_eq!(store.get(&keys[0]).as_deref(), Some("[zh-CN] Hello"));
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhaustion_does_not_break_translation() {
    let store = Rc::new(MemoryCacheStore::with_quota(10));
    let page = TestPage::build("<p>Hello world</p>", test_settings(), MockBackend::new(), store.clone());
    translate_once(&page).await;

    assert_eq!(text_of(&page.element("p", 0)), "[zh-CN] Hello world");
    assert!(store.is_empty());
    let stats = page.controller.cache_stats();
    assert_eq!(stats.write_failures, 1);
    assert_eq!(stats.hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_changing_target_language_misses_the_cache() {
    let page = TestPage::new("<p>Good morning</p>");

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
            page.controller.cancel();

            page.settings.update(|settings| settings.default_to_lang = "ja".to_string());
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;

    let calls = page.backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].to, "ja");
    assert_eq!(text_of(&page.element("p", 0)), "[ja] Good morning");
    assert_eq!(page.controller.cache_stats().hits, 0);
}
