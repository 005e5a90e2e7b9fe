//! 翻译客户端
//!
//! 对后端调用的薄封装：统一错误映射，去除模型输出的推理标记。

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use futures::future::LocalBoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::translation::error::{helpers, TranslationError, TranslationResult};

/// 请求内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// 单段文本
    Text,
    /// 以分隔符拼接的多段文本
    Multi,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Text => write!(f, "text"),
            ContentType::Multi => write!(f, "multi"),
        }
    }
}

/// 翻译请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: String,
    pub from: String,
    pub to: String,
    pub content_type: ContentType,
    pub model_id: String,
}

/// 后端响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslateResponse {
    pub success: bool,
    pub translated_text: Option<String>,
    pub error: Option<String>,
}

impl TranslateResponse {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            translated_text: Some(text.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            translated_text: None,
            error: Some(error.into()),
        }
    }
}

/// 翻译后端（扩展后台或直连的 HTTP 服务）
pub trait TranslationBackend {
    /// `Err` 表示传输层失败，`Ok` 中的 `success == false` 表示服务端失败
    fn translate(&self, request: TranslateRequest) -> LocalBoxFuture<'_, TranslationResult<TranslateResponse>>;
}

/// 客户端调用统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub requests: u64,
    pub failures: u64,
}

/// 翻译客户端
pub struct TranslationClient {
    backend: Rc<dyn TranslationBackend>,
    requests: Cell<u64>,
    failures: Cell<u64>,
}

impl TranslationClient {
    pub fn new(backend: Rc<dyn TranslationBackend>) -> Self {
        Self {
            backend,
            requests: Cell::new(0),
            failures: Cell::new(0),
        }
    }

    /// 发送一次请求，返回去除推理标记后的译文
    pub async fn translate(&self, request: TranslateRequest) -> TranslationResult<String> {
        self.requests.set(self.requests.get() + 1);
        tracing::debug!(
            target: "ling_translate::network",
            "发送翻译请求: {} 字符, {} -> {}, 类型 {}, 模型 {}",
            request.text.chars().count(),
            request.from,
            request.to,
            request.content_type,
            request.model_id
        );

        let result = self.backend.translate(request).await;
        let outcome = match result {
            Err(TranslationError::NetworkError(msg)) => Err(TranslationError::from_transport_message(msg)),
            Err(e) => Err(e),
            Ok(response) if !response.success => Err(helpers::service_error(
                response.error.unwrap_or_else(|| "未知错误".to_string()),
            )),
            Ok(response) => {
                let cleaned = strip_reasoning(response.translated_text.as_deref().unwrap_or_default());
                if cleaned.is_empty() {
                    Err(TranslationError::EmptyResult)
                } else {
                    Ok(cleaned)
                }
            }
        };

        if let Err(e) = &outcome {
            self.failures.set(self.failures.get() + 1);
            tracing::debug!(target: "ling_translate::network", "翻译请求失败: {}", e);
        }
        outcome
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.get(),
            failures: self.failures.get(),
        }
    }
}

/// 去除 `<think>`/`<analysis>` 推理块（包括未闭合的尾部块）并修剪空白
pub fn strip_reasoning(text: &str) -> String {
    static CLOSED: OnceLock<Option<Regex>> = OnceLock::new();
    static UNCLOSED: OnceLock<Option<Regex>> = OnceLock::new();

    let mut cleaned = text.to_string();
    if let Some(closed) = CLOSED
        .get_or_init(|| Regex::new(r"(?is)<think>.*?</think>|<analysis>.*?</analysis>").ok())
    {
        cleaned = closed.replace_all(&cleaned, "").into_owned();
    }
    if let Some(unclosed) = UNCLOSED.get_or_init(|| Regex::new(r"(?is)<(?:think|analysis)>.*$").ok()) {
        cleaned = unclosed.replace(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}
