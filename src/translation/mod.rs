//! 翻译模块
//!
//! 页面内翻译引擎，按层次组织：
//! - **core**: 条目状态机、编排器、限速、翻译客户端、运行控制
//! - **pipeline**: 文本扫描、元素过滤、批次合并
//! - **storage**: 页面级翻译缓存
//! - **config**: 用户设置与配置文件
//! - **error**: 错误处理
//! - **logging**: 分类别日志
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use ling_translate::parsers::html::dom::parse_html;
//! use ling_translate::translation::config::ConfigManager;
//! use ling_translate::translation::core::{FullPageViewport, LogUi, OpenAiBackend, RunController};
//! use ling_translate::translation::core::LimiterRegistry;
//! use ling_translate::translation::storage::{MemoryCacheStore, PageCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dom = parse_html("<p>Hello world</p>");
//! let settings = Rc::new(ConfigManager::new()?);
//! let controller = RunController::new(
//!     dom.document.clone(),
//!     settings.clone(),
//!     Rc::new(OpenAiBackend::new(settings)),
//!     Rc::new(PageCache::new(Rc::new(MemoryCacheStore::new()), "file:///page.html")),
//!     Rc::new(LimiterRegistry::new()),
//!     Rc::new(LogUi),
//! );
//! controller.start(&FullPageViewport).await?;
//! controller.until_settled().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod storage;

pub use config::{constants, ConfigManager, SettingsProvider, StaticSettings, UserSettings};
pub use core::{RunController, StartOutcome};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use storage::{CacheStats, PageCache};
