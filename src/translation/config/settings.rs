//! 用户设置模型
//!
//! 与扩展存储中的 JSON 结构保持一致（camelCase），读取结果总是补全默认值并完成迁移。

use std::cell::RefCell;

use futures::future::{self, LocalBoxFuture};
use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 加载指示的呈现方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStyle {
    None,
    Text,
    #[default]
    Spinner,
    Both,
}

impl LoadingStyle {
    pub fn shows_text(self) -> bool {
        matches!(self, LoadingStyle::Text | LoadingStyle::Both)
    }

    pub fn shows_spinner(self) -> bool {
        matches!(self, LoadingStyle::Spinner | LoadingStyle::Both)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "off" => Some(LoadingStyle::None),
            "text" => Some(LoadingStyle::Text),
            "spinner" => Some(LoadingStyle::Spinner),
            "both" => Some(LoadingStyle::Both),
            _ => None,
        }
    }
}

/// 开发者日志开关
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeveloperSettings {
    pub enabled: bool,
    pub log_dom: bool,
    pub log_translation: bool,
    pub log_network: bool,
}

/// 模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    /// 请求体中的 model 字段
    pub name: String,
    pub max_tokens: u32,
    /// 单次合并请求的最大段落数
    pub max_paragraphs: Option<usize>,
    pub concurrency: Option<u32>,
    pub requests_per_second: Option<u32>,
    pub system_prompt: String,
    pub prompt: String,
    pub system_multiple_prompt: String,
    pub multiple_prompt: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            max_tokens: 0,
            max_paragraphs: None,
            concurrency: None,
            requests_per_second: None,
            system_prompt: "You are a professional {{to}} native translator. Output only the translation.".to_string(),
            prompt: "Translate to {{to}} (output translation only):\n\n{{text}}".to_string(),
            system_multiple_prompt: "You are a professional {{to}} native translator. Paragraphs are separated by a line containing only %%. Keep every separator and the paragraph count unchanged.".to_string(),
            multiple_prompt: "Translate to {{to}}:\n\n{{text}}".to_string(),
        }
    }
}

/// 单个模型的调度限制（已钳制到合法范围）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    pub concurrency: u32,
    pub requests_per_second: u32,
    pub max_batch_size: usize,
}

impl ModelConfig {
    /// 计算调度限制：rps 缺省时沿用并发数，再缺省为 12
    pub fn limits(&self) -> ModelLimits {
        let concurrency = self.concurrency.unwrap_or(constants::DEFAULT_CONCURRENCY);
        let requests_per_second = self
            .requests_per_second
            .or(self.concurrency)
            .unwrap_or(constants::DEFAULT_REQUESTS_PER_SECOND);
        ModelLimits {
            concurrency: concurrency.max(1),
            requests_per_second: requests_per_second.max(1),
            max_batch_size: self
                .max_paragraphs
                .unwrap_or(constants::DEFAULT_MAX_PARAGRAPHS)
                .max(1),
        }
    }
}

/// API 服务配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<ModelConfig>,
}

/// 引擎调优参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// 单个条目的总尝试次数
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap: u32,
    pub min_loading_ms: u64,
    pub lookahead_px: u32,
    pub scan_slice_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap: constants::DEFAULT_BACKOFF_CAP,
            min_loading_ms: constants::DEFAULT_MIN_LOADING_MS,
            lookahead_px: constants::DEFAULT_LOOKAHEAD_PX,
            scan_slice_ms: constants::DEFAULT_SCAN_SLICE_MS,
        }
    }
}

/// 用户设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub default_from_lang: String,
    pub default_to_lang: String,
    /// 格式为 "apiId:modelId"
    pub default_model_id: String,
    pub api_configs: Vec<ApiConfig>,
    pub loading_style: Option<LoadingStyle>,
    /// 旧版布尔开关，迁移后清空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_loading_icon: Option<bool>,
    pub developer: DeveloperSettings,
    pub engine: EngineSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_from_lang: constants::DEFAULT_FROM_LANG.to_string(),
            default_to_lang: constants::DEFAULT_TO_LANG.to_string(),
            default_model_id: "default-api:default-model".to_string(),
            api_configs: Vec::new(),
            loading_style: Some(LoadingStyle::default()),
            show_loading_icon: None,
            developer: DeveloperSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl UserSettings {
    /// 从 JSON 解析并迁移
    pub fn from_json(content: &str) -> TranslationResult<Self> {
        let settings: UserSettings = serde_json::from_str(content)?;
        Ok(settings.migrated())
    }

    /// 把旧版 `showLoadingIcon` 迁移为 `loadingStyle`，并修正空语言
    pub fn migrated(mut self) -> Self {
        if self.loading_style.is_none() {
            self.loading_style = Some(match self.show_loading_icon {
                Some(false) => LoadingStyle::None,
                _ => LoadingStyle::Spinner,
            });
        }
        self.show_loading_icon = None;

        if self.default_from_lang.trim().is_empty() {
            self.default_from_lang = constants::DEFAULT_FROM_LANG.to_string();
        }
        if self.default_to_lang.trim().is_empty() {
            self.default_to_lang = constants::DEFAULT_TO_LANG.to_string();
        }
        self
    }

    pub fn loading_style(&self) -> LoadingStyle {
        self.loading_style.unwrap_or_default()
    }

    /// 解析当前选中的模型
    pub fn selected_model(&self) -> Option<(&ApiConfig, &ModelConfig)> {
        let (api_id, model_id) = self.default_model_id.split_once(':')?;
        let api = self.api_configs.iter().find(|api| api.id == api_id)?;
        let model = api.models.iter().find(|model| model.id == model_id)?;
        Some((api, model))
    }

    /// 运行前检查：必须选中一个可解析的模型
    pub fn require_model(&self) -> TranslationResult<(&ApiConfig, &ModelConfig)> {
        if self.default_model_id.trim().is_empty() {
            return Err(TranslationError::ConfigError("未选择翻译模型".to_string()));
        }
        self.selected_model().ok_or_else(|| {
            TranslationError::ConfigError(format!(
                "未找到所选模型: {}",
                self.default_model_id
            ))
        })
    }

    /// 验证设置
    pub fn validate(&self) -> TranslationResult<()> {
        for api in &self.api_configs {
            if api.id.is_empty() {
                return Err(TranslationError::ConfigError("API 配置缺少 id".to_string()));
            }
            if !api.base_url.is_empty() {
                url::Url::parse(&api.base_url)
                    .map_err(|e| TranslationError::ConfigError(format!("API 地址无效 {}: {}", api.base_url, e)))?;
            }
            if api.models.iter().any(|m| m.id.is_empty()) {
                return Err(TranslationError::ConfigError(format!("API {} 存在缺少 id 的模型", api.id)));
            }
        }

        if self.engine.max_attempts == 0 {
            return Err(TranslationError::ConfigError("最大尝试次数不能为0".to_string()));
        }

        Ok(())
    }
}

/// 设置变更回调
pub type SettingsListener = Box<dyn Fn(&UserSettings)>;

/// 设置提供者
pub trait SettingsProvider {
    /// 返回补全默认值并迁移后的设置，读取失败时返回默认设置
    fn get_settings(&self) -> LocalBoxFuture<'_, UserSettings>;

    /// 注册设置变更监听
    fn on_settings_changed(&self, listener: SettingsListener);
}

/// 内存中的设置提供者
#[derive(Default)]
pub struct StaticSettings {
    settings: RefCell<UserSettings>,
    listeners: RefCell<Vec<SettingsListener>>,
}

impl StaticSettings {
    pub fn new(settings: UserSettings) -> Self {
        Self {
            settings: RefCell::new(settings.migrated()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> UserSettings {
        self.settings.borrow().clone()
    }

    /// 修改设置并通知所有监听者
    pub fn update(&self, f: impl FnOnce(&mut UserSettings)) {
        let snapshot = {
            let mut settings = self.settings.borrow_mut();
            f(&mut settings);
            settings.clone()
        };
        for listener in self.listeners.borrow().iter() {
            listener(&snapshot);
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn get_settings(&self) -> LocalBoxFuture<'_, UserSettings> {
        Box::pin(future::ready(self.snapshot()))
    }

    fn on_settings_changed(&self, listener: SettingsListener) {
        self.listeners.borrow_mut().push(listener);
    }
}
