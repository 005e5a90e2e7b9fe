//! 错误处理集成测试
//!
//! 重试与最终失败、过期运行的结果丢弃、通道失效、配置缺失

use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;
use tokio::time::Instant;

use ling_translate::translation::core::{
    ContentType, FullPageViewport, ItemStatus, StartOutcome, CHANNEL_INVALIDATED_NOTICE,
};
use ling_translate::translation::error::{ErrorCategory, TranslationError};
use ling_translate::translation::storage::MemoryCacheStore;

mod common {
    include!("common/mod.rs");
}

use common::{attr, test_settings, text_of, MockBackend, MockMode, SetViewport, TestPage};

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_marks_item_failed() {
    let page = TestPage::new("<p class=\"intro\">Hello world</p>");
    page.backend.set_mode(MockMode::FailService("quota exceeded".to_string()));
    let started = Instant::now();

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;

    // 三次尝试，两次退避：1000ms + 2000ms
    assert_eq!(page.backend.call_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(3000));

    let p = page.element("p", 0);
    assert_eq!(text_of(&p), "Hello world");
    assert_eq!(attr(&p, "class").as_deref(), Some("intro ling-translate-error"));
    let reason = attr(&p, "data-translate-error").unwrap();
    assert!(reason.contains("quota exceeded"));
    assert_eq!(attr(&p, "title"), Some(format!("翻译失败: {}", reason)));
    assert_eq!(attr(&p, "data-translated"), None);

    let orchestrator = page.controller.orchestrator().unwrap();
    assert_eq!(orchestrator.status(0), Some(ItemStatus::Error));
    let stats = orchestrator.stats();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.retries_scheduled, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 0);

    let errors = orchestrator.error_stats();
    assert_eq!(errors.total_errors, 3);
    assert_eq!(errors.retryable_errors, 3);
    assert_eq!(errors.by_category.get(&ErrorCategory::Service), Some(&3));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_on_retry() {
    let page = TestPage::new("<p>Hello world</p>");
    page.backend.fail_next(1);

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;

    assert_eq!(page.backend.call_count(), 2);
    let p = page.element("p", 0);
    assert_eq!(text_of(&p), "[zh-CN] Hello world");
    assert_eq!(attr(&p, "class"), None);
    assert_eq!(attr(&p, "data-translate-error"), None);
    assert_eq!(page.controller.orchestrator().unwrap().status(0), Some(ItemStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_failed_combined_request_retries_whole_item() {
    let page = TestPage::new("<p>Alpha<br>Beta</p>");
    page.backend.fail_next(1);

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;

    // 合并请求失败后整个条目重试，再次走合并请求
    let calls = page.backend.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.content_type == ContentType::Multi));
    assert_eq!(text_of(&page.element("p", 0)), "[zh-CN] Alpha[zh-CN] Beta");
}

#[tokio::test(start_paused = true)]
async fn test_broken_combined_response_falls_back_to_single_requests() {
    let page = TestPage::new("<p>Alpha<br>Beta</p>");
    page.backend.set_mode(MockMode::BreakMulti);

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            page.controller.until_settled().await;
        })
        .await;

    let kinds: Vec<ContentType> = page.backend.calls().iter().map(|call| call.content_type).collect();
    assert_eq!(kinds, vec![ContentType::Multi, ContentType::Text, ContentType::Text]);
    assert_eq!(text_of(&page.element("p", 0)), "[zh-CN] Alpha[zh-CN] Beta");

    let orchestrator = page.controller.orchestrator().unwrap();
    assert_eq!(orchestrator.coordinator().stats().integrity_failures, 1);
    assert_eq!(orchestrator.stats().attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_results_of_cancelled_run_are_discarded() {
    let page = TestPage::new("<p title=\"t\">Slow sentence</p>");
    page.backend.set_delay(Duration::from_millis(500));
    let before = page.html();

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            let orchestrator = page.controller.orchestrator().unwrap();

            // 请求已发出但尚未返回
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(page.backend.call_count(), 1);
            assert_eq!(page.controller.cancel(), 1);
            assert_eq!(page.html(), before);

            page.controller.until_settled().await;
            assert_eq!(page.html(), before);
            assert_eq!(orchestrator.stats().succeeded, 0);
            assert!(orchestrator.stats().stale_drops >= 1);
            assert!(!orchestrator.run().is_current());

            // 新运行不受旧结果影响
            page.backend.set_delay(Duration::ZERO);
            let outcome = page.controller.start(&FullPageViewport).await.unwrap();
            assert_eq!(outcome, StartOutcome::Started { items: 1, activated: 1 });
            page.controller.until_settled().await;
        })
        .await;

    assert_eq!(text_of(&page.element("p", 0)), "[zh-CN] Slow sentence");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_backoff_stops_further_attempts() {
    let page = TestPage::new("<p>Hello world</p>");
    page.backend.set_mode(MockMode::FailService("busy".to_string()));
    let before = page.html();

    LocalSet::new()
        .run_until(async {
            page.controller.start(&FullPageViewport).await.unwrap();
            // 首次尝试（含最短加载时长）结束，等待 1000ms 退避
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(page.backend.call_count(), 1);

            page.controller.cancel();
            page.controller.until_settled().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;

    assert_eq!(page.backend.call_count(), 1);
    assert_eq!(page.html(), before);
}

#[tokio::test(start_paused = true)]
async fn test_channel_invalidation_halts_the_page() {
    let page = TestPage::new("<p>One</p><p>Two</p><p>Three</p>");
    page.backend.set_mode(MockMode::Transport("Extension context invalidated.".to_string()));
    let (one, two, three) = (page.element("p", 0), page.element("p", 1), page.element("p", 2));
    let viewport = SetViewport::showing(&[one.clone(), two.clone()]);

    LocalSet::new()
        .run_until(async {
            page.controller.start(&viewport).await.unwrap();
            page.controller.until_settled().await;

            assert_eq!(page.backend.call_count(), 2);
            assert!(page.controller.page_state().channel_invalidated());

            // 之后进入视口的条目直接失败，不再发请求
            viewport.show(&three);
            page.controller.handle_viewport_change(&viewport);
            page.controller.until_settled().await;
        })
        .await;

    assert_eq!(page.backend.call_count(), 2);
    assert_eq!(page.ui.notices.borrow().as_slice(), &[CHANNEL_INVALIDATED_NOTICE.to_string()]);
    for p in [&one, &two, &three] {
        assert!(attr(p, "class").unwrap().contains("ling-translate-error"));
    }
    assert_eq!(attr(&three, "data-translate-error").as_deref(), Some(CHANNEL_INVALIDATED_NOTICE));

    let stats = page.controller.orchestrator().unwrap().stats();
    assert_eq!(stats.retries_scheduled, 0);
    assert_eq!(stats.halted, 1);

    let errors = page.controller.orchestrator().unwrap().error_stats();
    assert_eq!(errors.by_category.get(&ErrorCategory::Channel), Some(&2));
    assert_eq!(errors.critical_errors, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pending_retry_is_halted_after_channel_invalidation() {
    let page = TestPage::new("<p>One</p><p>Two</p>");
    page.backend.fail_next(1);
    let (one, two) = (page.element("p", 0), page.element("p", 1));
    let viewport = SetViewport::showing(&[one.clone()]);

    LocalSet::new()
        .run_until(async {
            page.controller.start(&viewport).await.unwrap();
            // 第一段首次失败，正在等待 1000ms 退避
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(page.backend.call_count(), 1);

            page.backend.set_mode(MockMode::Transport("Extension context invalidated.".to_string()));
            viewport.show(&two);
            page.controller.handle_viewport_change(&viewport);
            page.controller.until_settled().await;
        })
        .await;

    assert!(page.controller.page_state().channel_invalidated());
    assert_eq!(page.backend.call_count(), 2);
    assert_eq!(text_of(&one), "One");
    assert_eq!(attr(&one, "data-translate-error").as_deref(), Some(CHANNEL_INVALIDATED_NOTICE));
    assert!(attr(&two, "class").unwrap().contains("ling-translate-error"));

    let orchestrator = page.controller.orchestrator().unwrap();
    assert_eq!(orchestrator.status(0), Some(ItemStatus::Error));
    assert_eq!(orchestrator.stats().halted, 1);
    assert_eq!(orchestrator.stats().retries_scheduled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_model_prompts_for_settings() {
    let mut settings = test_settings();
    settings.default_model_id = "ghost:none".to_string();
    let page = TestPage::build("<p>Hello</p>", settings, MockBackend::new(), Rc::new(MemoryCacheStore::new()));
    page.ui.accept_settings_prompt.set(true);
    let before = page.html();

    let result = LocalSet::new()
        .run_until(async { page.controller.start(&FullPageViewport).await })
        .await;

    assert!(matches!(result, Err(TranslationError::ConfigError(_))));
    assert_eq!(page.ui.prompts.borrow().len(), 1);
    assert_eq!(page.ui.settings_opened.get(), 1);
    assert!(!page.controller.is_enabled());
    assert_eq!(page.backend.call_count(), 0);
    assert_eq!(page.html(), before);
}

#[tokio::test(start_paused = true)]
async fn test_declined_settings_prompt_does_not_open_settings() {
    let mut settings = test_settings();
    settings.default_model_id = String::new();
    let page = TestPage::build("<p>Hello</p>", settings, MockBackend::new(), Rc::new(MemoryCacheStore::new()));

    let result = LocalSet::new()
        .run_until(async { page.controller.start(&FullPageViewport).await })
        .await;

    assert!(result.is_err());
    assert_eq!(page.ui.prompts.borrow().as_slice(), &["未选择翻译模型".to_string()]);
    assert_eq!(page.ui.settings_opened.get(), 0);
}
