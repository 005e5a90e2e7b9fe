//! 翻译核心
//!
//! ## 模块依赖关系
//!
//! ```text
//! RunController (run.rs)
//!     ├── TextScanner (pipeline/scanner.rs)
//!     ├── VisibilityScheduler (visibility.rs)
//!     └── Orchestrator (orchestrator.rs)
//!             ├── transition / TranslationItem (item.rs)
//!             ├── DomMarkers (markers.rs)
//!             └── BatchCoordinator (pipeline/batch.rs)
//!                     ├── RateLimiter (limiter.rs)
//!                     ├── PageCache (storage/cache.rs)
//!                     └── TranslationClient (client.rs)
//!                             └── OpenAiBackend (openai.rs)
//! ```

pub mod client;
pub mod item;
pub mod limiter;
pub mod markers;
pub mod openai;
pub mod orchestrator;
pub mod run;
pub mod visibility;

pub use client::{
    strip_reasoning, ClientStats, ContentType, TranslateRequest, TranslateResponse, TranslationBackend,
    TranslationClient,
};
pub use item::{
    transition, AttemptOutcome, ItemAction, ItemEvent, ItemId, ItemState, ItemStatus, RetryPolicy, TranslatableUnit,
    Transition, TranslationItem, UnitStatus,
};
pub use limiter::{LimiterRegistry, LimiterSnapshot, RateLimiter};
pub use markers::DomMarkers;
pub use openai::OpenAiBackend;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStats, CHANNEL_INVALIDATED_NOTICE};
pub use run::{HostUi, LogUi, RunController, RunGeneration, RunToken, StartOutcome};
pub use visibility::{FullPageViewport, Viewport, VisibilityChange, VisibilityScheduler};
