//! 翻译模块统一错误处理
//!
//! 错误按可恢复性分层：单元失败在条目内重试，批次完整性失败在同一次尝试内
//! 回退为逐条请求，通道失效与配置错误不可恢复。

use std::fmt;

use thiserror::Error;

/// 扩展运行时通道失效时宿主返回的典型消息片段
const CHANNEL_INVALIDATED_MARKERS: &[&str] = &[
    "extension context invalidated",
    "receiving end does not exist",
    "message port closed",
];

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 批次完整性错误（分段数量不符或出现空段）
    #[error("批次完整性错误: {0}")]
    BatchIntegrity(String),

    /// 翻译服务返回失败
    #[error("翻译服务错误: {0}")]
    TranslationServiceError(String),

    /// 去除推理标记后结果为空
    #[error("翻译结果为空")]
    EmptyResult,

    /// 扩展运行时通道失效
    #[error("通信通道已失效: {0}")]
    ChannelInvalidated(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 根据传输层错误消息构造错误，识别通道失效
    pub fn from_transport_message<T: fmt::Display>(msg: T) -> Self {
        let msg = msg.to_string();
        let lowered = msg.to_lowercase();
        if CHANNEL_INVALIDATED_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            TranslationError::ChannelInvalidated(msg)
        } else {
            TranslationError::NetworkError(msg)
        }
    }

    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::TranslationServiceError(_) => true,
            TranslationError::EmptyResult => true,
            TranslationError::BatchIntegrity(_) => true,
            TranslationError::CacheError(_) => true,
            TranslationError::ChannelInvalidated(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 是否为通道失效
    pub fn is_channel_invalidated(&self) -> bool {
        matches!(self, TranslationError::ChannelInvalidated(_))
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::ChannelInvalidated(_) => ErrorSeverity::Critical,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::CacheError(_) => ErrorSeverity::Warning,
            TranslationError::BatchIntegrity(_) => ErrorSeverity::Info,
            TranslationError::TranslationServiceError(_) => ErrorSeverity::Error,
            TranslationError::EmptyResult => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::ChannelInvalidated(_) => ErrorCategory::Channel,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::CacheError(_) => ErrorCategory::Cache,
            TranslationError::BatchIntegrity(_) => ErrorCategory::Batch,
            TranslationError::TranslationServiceError(_) => ErrorCategory::Service,
            TranslationError::EmptyResult => ErrorCategory::Service,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 不含类别前缀的原始消息
    pub fn message(&self) -> String {
        match self {
            TranslationError::ConfigError(msg)
            | TranslationError::NetworkError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::CacheError(msg)
            | TranslationError::BatchIntegrity(msg)
            | TranslationError::TranslationServiceError(msg)
            | TranslationError::ChannelInvalidated(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InternalError(msg) => msg.clone(),
            TranslationError::EmptyResult => self.to_string(),
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Channel,
    Input,
    Cache,
    Batch,
    Service,
    Timeout,
    Parsing,
    Serialization,
    Internal,
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::InternalError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<url::ParseError> for TranslationError {
    fn from(error: url::ParseError) -> Self {
        TranslationError::ConfigError(format!("URL无效: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(format!("请求超时: {}", error))
        } else if error.is_decode() {
            TranslationError::ParseError(format!("响应解析失败: {}", error))
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建缓存错误
    pub fn cache_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::CacheError(msg.to_string())
    }

    /// 创建服务错误
    pub fn service_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::TranslationServiceError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_classification() {
        let err = TranslationError::from_transport_message("Extension context invalidated.");
        assert!(err.is_channel_invalidated());
        assert!(!err.is_retryable());

        let err = TranslationError::from_transport_message("connection reset");
        assert_eq!(err, TranslationError::NetworkError("connection reset".to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&TranslationError::ConfigError("no model".into()));
        stats.record_error(&TranslationError::NetworkError("down".into()));
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.critical_errors, 1);
        assert_eq!(stats.retryable_errors, 1);
        assert_eq!(stats.by_category.get(&ErrorCategory::Network), Some(&1));
        assert_eq!(stats.by_severity.get(&ErrorSeverity::Critical), Some(&1));
    }

    #[test]
    fn test_helpers_build_expected_variants() {
        assert_eq!(helpers::service_error("busy").severity(), ErrorSeverity::Error);
        assert!(helpers::cache_error("full").is_retryable());
    }
}
