//! 配置管理器
//!
//! 按顺序查找设置文件（TOML 或 JSON），加载 .env，再应用环境变量覆盖

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use futures::future::{self, LocalBoxFuture};

use super::constants;
use super::settings::{ApiConfig, ModelConfig, SettingsListener, SettingsProvider, UserSettings};
use crate::translation::error::{TranslationError, TranslationResult};

/// 基于文件的设置提供者
pub struct ConfigManager {
    settings: RefCell<UserSettings>,
    source: Option<PathBuf>,
    listeners: RefCell<Vec<SettingsListener>>,
}

impl ConfigManager {
    /// 创建新的配置管理器，在默认路径中查找设置文件
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let source = constants::CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        match source {
            Some(path) => Self::from_path(path),
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                Self::with_settings(UserSettings::default(), None)
            }
        }
    }

    /// 从指定文件创建
    pub fn from_path(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(&path.as_ref().to_string_lossy()).as_ref());
        tracing::info!("加载配置文件: {}", expanded.display());
        let settings = Self::load_from_file(&expanded)?;
        Self::with_settings(settings, Some(expanded))
    }

    fn with_settings(mut settings: UserSettings, source: Option<PathBuf>) -> TranslationResult<Self> {
        Self::apply_env_overrides(&mut settings);
        settings.validate()?;
        Ok(Self {
            settings: RefCell::new(settings),
            source,
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// 获取当前设置
    pub fn get_config(&self) -> UserSettings {
        self.settings.borrow().clone()
    }

    /// 设置来源文件
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 重新读取设置文件并通知监听者；失败时保留旧设置
    pub fn reload(&self) -> TranslationResult<()> {
        let Some(path) = self.source.as_ref() else {
            return Ok(());
        };

        let mut settings = Self::load_from_file(path)?;
        Self::apply_env_overrides(&mut settings);
        settings.validate()?;

        *self.settings.borrow_mut() = settings.clone();
        tracing::info!("配置已重新加载: {}", path.display());
        for listener in self.listeners.borrow().iter() {
            listener(&settings);
        }
        Ok(())
    }

    /// 从指定文件加载设置
    fn load_from_file(path: &Path) -> TranslationResult<UserSettings> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let settings: UserSettings = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))?
        };

        Ok(settings.migrated())
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 应用环境变量覆盖（无效值只记录警告）
    pub fn apply_env_overrides(settings: &mut UserSettings) {
        use crate::env::{core, translation, EnvVar};

        match translation::TargetLang::get_set() {
            Some(Ok(lang)) => settings.default_to_lang = lang,
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match translation::SourceLang::get_set() {
            Some(Ok(lang)) => settings.default_from_lang = lang,
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match translation::ModelId::get_set() {
            Some(Ok(model_id)) => {
                tracing::info!("环境变量覆盖模型: {}", model_id);
                settings.default_model_id = model_id;
            }
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match translation::Loading::get_set() {
            Some(Ok(style)) => settings.loading_style = Some(style),
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match translation::MaxAttempts::get_set() {
            Some(Ok(attempts)) => settings.engine.max_attempts = attempts,
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match core::Developer::get_set() {
            Some(Ok(enabled)) => {
                settings.developer.enabled = enabled;
                settings.developer.log_dom = enabled;
                settings.developer.log_translation = enabled;
                settings.developer.log_network = enabled;
            }
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }

        match translation::ApiKey::get_set() {
            Some(Ok(key)) => {
                let api_id = settings
                    .default_model_id
                    .split_once(':')
                    .map(|(api, _)| api.to_string());
                if let Some(api) = settings
                    .api_configs
                    .iter_mut()
                    .find(|api| Some(&api.id) == api_id.as_ref())
                {
                    api.api_key = key;
                }
            }
            Some(Err(e)) => tracing::warn!("忽略环境变量: {}", e),
            None => {}
        }
    }

    /// 示例设置
    pub fn example_settings() -> UserSettings {
        UserSettings {
            default_model_id: "openai:gpt-4o-mini".to_string(),
            api_configs: vec![ApiConfig {
                id: "openai".to_string(),
                name: "OpenAI".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                models: vec![ModelConfig {
                    id: "gpt-4o-mini".to_string(),
                    name: "gpt-4o-mini".to_string(),
                    max_paragraphs: Some(constants::DEFAULT_MAX_PARAGRAPHS),
                    concurrency: Some(constants::DEFAULT_CONCURRENCY),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    /// 渲染示例配置（TOML）
    pub fn example_config_toml() -> TranslationResult<String> {
        toml::to_string_pretty(&Self::example_settings())
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let content = Self::example_config_toml()?;
        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;
        Ok(())
    }
}

impl SettingsProvider for ConfigManager {
    fn get_settings(&self) -> LocalBoxFuture<'_, UserSettings> {
        Box::pin(future::ready(self.get_config()))
    }

    fn on_settings_changed(&self, listener: SettingsListener) {
        self.listeners.borrow_mut().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ling-translate-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_example_config_round_trips_through_toml() {
        let path = temp_path("example.toml");
        ConfigManager::generate_example_config(path.to_str().unwrap()).unwrap();

        let manager = ConfigManager::from_path(&path).unwrap();
        let settings = manager.get_config();
        assert!(settings.selected_model().is_some());
        assert_eq!(manager.source(), Some(path.as_path()));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_json_settings_are_migrated() {
        let path = temp_path("settings.json");
        std::fs::write(&path, r#"{"defaultToLang": "ja", "showLoadingIcon": false}"#).unwrap();

        let manager = ConfigManager::from_path(&path).unwrap();
        let settings = manager.get_config();
        assert_eq!(settings.default_to_lang, "ja");
        assert_eq!(settings.loading_style(), crate::translation::config::LoadingStyle::None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let path = temp_path("broken.toml");
        std::fs::write(&path, "defaultToLang = [").unwrap();
        assert!(matches!(
            ConfigManager::from_path(&path),
            Err(TranslationError::ConfigError(_))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_reload_notifies_listeners() {
        let path = temp_path("reload.json");
        std::fs::write(&path, r#"{"defaultToLang": "ja"}"#).unwrap();
        let manager = ConfigManager::from_path(&path).unwrap();

        let seen = std::rc::Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        manager.on_settings_changed(Box::new(move |s| *sink.borrow_mut() = s.default_to_lang.clone()));

        std::fs::write(&path, r#"{"defaultToLang": "ko"}"#).unwrap();
        manager.reload().unwrap();
        assert_eq!(seen.borrow().as_str(), "ko");

        std::fs::remove_file(path).ok();
    }
}
