//! OpenAI 兼容的聊天补全后端
//!
//! 每次请求都从设置中解析 `apiId:modelId`，按内容类型选择提示词，
//! 请求 `{base_url}/chat/completions`。

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use super::client::{ContentType, TranslateRequest, TranslateResponse, TranslationBackend};
use crate::translation::config::{constants, language_name, ModelConfig, SettingsProvider, UserSettings};
use crate::translation::error::TranslationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// 解析后的一次调用
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub url: String,
    pub api_key: String,
    pub body: ChatRequest,
}

/// 聊天补全后端
pub struct OpenAiBackend {
    settings: Rc<dyn SettingsProvider>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(settings: Rc<dyn SettingsProvider>) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, request: TranslateRequest) -> TranslationResult<TranslateResponse> {
        let settings = self.settings.get_settings().await;
        let call = match prepare_call(&settings, &request) {
            Ok(call) => call,
            Err(message) => return Ok(TranslateResponse::failed(message)),
        };

        tracing::debug!(target: "ling_translate::network", "POST {} (模型 {})", call.url, call.body.model);

        let response = self
            .client
            .post(&call.url)
            .header("Authorization", format!("Bearer {}", call.api_key))
            .json(&call.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let message = body
                .error
                .and_then(|detail| detail.message)
                .unwrap_or_else(|| format!("API Error: {}", status.canonical_reason().unwrap_or(status.as_str())));
            tracing::warn!(target: "ling_translate::network", "翻译接口返回 {}: {}", status, message);
            return Ok(TranslateResponse::failed(message));
        }

        let body: ChatResponse = response.json().await?;
        Ok(TranslateResponse::ok(first_choice_content(body)))
    }
}

impl TranslationBackend for OpenAiBackend {
    fn translate(&self, request: TranslateRequest) -> LocalBoxFuture<'_, TranslationResult<TranslateResponse>> {
        Box::pin(self.send(request))
    }
}

/// 根据设置构造请求；找不到配置时返回面向用户的错误消息
pub fn prepare_call(settings: &UserSettings, request: &TranslateRequest) -> Result<PreparedCall, String> {
    let (api_id, model_id) = request.model_id.split_once(':').unwrap_or((request.model_id.as_str(), ""));

    let api = settings
        .api_configs
        .iter()
        .find(|api| api.id == api_id)
        .ok_or_else(|| "API Configuration not found".to_string())?;
    let model = api
        .models
        .iter()
        .find(|model| model.id == model_id)
        .ok_or_else(|| "Model Configuration not found".to_string())?;

    Ok(PreparedCall {
        url: format!("{}/chat/completions", api.base_url.trim_end_matches('/')),
        api_key: api.api_key.clone(),
        body: build_chat_request(model, request),
    })
}

fn build_chat_request(model: &ModelConfig, request: &TranslateRequest) -> ChatRequest {
    let lang = language_name(&request.to);
    let use_multiple = request.content_type == ContentType::Multi
        && !model.system_multiple_prompt.is_empty()
        && !model.multiple_prompt.is_empty();

    let (system_template, user_template) = if use_multiple {
        (&model.system_multiple_prompt, &model.multiple_prompt)
    } else {
        (&model.system_prompt, &model.prompt)
    };

    let system = system_template.replacen("{{to}}", lang, 1);
    let user = user_template.replacen("{{to}}", lang, 1).replacen("{{text}}", &request.text, 1);

    ChatRequest {
        model: model.name.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system,
            },
            ChatMessage {
                role: "user".to_string(),
                content: user,
            },
        ],
        temperature: constants::DEFAULT_TEMPERATURE,
        max_tokens: (model.max_tokens > 0).then_some(model.max_tokens),
    }
}

fn first_choice_content(body: ChatResponse) -> String {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .map(|message| message.content)
        .unwrap_or_default()
}
