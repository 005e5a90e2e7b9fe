//! 翻译管道模块
//!
//! 文本扫描、过滤与批次处理

pub mod batch;
pub mod filters;
pub mod scanner;

// 重新导出主要类型
pub use batch::{split_segments, BatchContext, BatchCoordinator, BatchStats, UnitOutcome, UnitRequest};
pub use filters::{Editable, ElementFilter};
pub use scanner::{ScanStats, ScannedGroup, ScannerConfig, TextScanner};
