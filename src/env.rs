//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，用于覆盖设置文件中的值

use std::env;
use std::fmt;

use crate::translation::config::LoadingStyle;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只在变量被显式设置时返回值
    fn get_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LING_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid log level '{}'. Use: trace, debug, info, warn, error", value),
                }),
            }
        }
    }

    /// 开发者日志总开关
    pub struct Developer;
    impl EnvVar<bool> for Developer {
        const NAME: &'static str = "LING_DEVELOPER";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Enable developer logging of dom/translation/network categories";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "LING_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language code, e.g. zh-CN";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(value, Self::NAME)
        }
    }

    /// 源语言
    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "LING_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Source language code ('auto' for detection)";

        fn parse(value: &str) -> EnvResult<String> {
            if value.trim().eq_ignore_ascii_case("auto") {
                return Ok("auto".to_string());
            }
            parse_lang(value, Self::NAME)
        }
    }

    /// 选中的模型
    pub struct ModelId;
    impl EnvVar<String> for ModelId {
        const NAME: &'static str = "LING_MODEL_ID";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Selected model in the form apiId:modelId";

        fn parse(value: &str) -> EnvResult<String> {
            let value = value.trim();
            match value.split_once(':') {
                Some((api, model)) if !api.is_empty() && !model.is_empty() => Ok(value.to_string()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Model id must look like apiId:modelId".to_string(),
                }),
            }
        }
    }

    /// API 密钥，覆盖所选 API 配置
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "LING_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "API key for the selected API configuration";

        fn parse(value: &str) -> EnvResult<String> {
            let key = value.trim();
            if key.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API key cannot be empty".to_string(),
                });
            }
            Ok(key.to_string())
        }
    }

    /// 加载指示样式
    pub struct Loading;
    impl EnvVar<LoadingStyle> for Loading {
        const NAME: &'static str = "LING_LOADING_STYLE";
        const DEFAULT: Option<LoadingStyle> = Some(LoadingStyle::Spinner);
        const DESCRIPTION: &'static str = "Loading indicator: none, text, spinner, both";

        fn parse(value: &str) -> EnvResult<LoadingStyle> {
            LoadingStyle::parse(value).ok_or_else(|| EnvError {
                variable: Self::NAME.to_string(),
                message: format!("Invalid loading style '{}'", value),
            })
        }
    }

    /// 单个条目最大尝试次数
    pub struct MaxAttempts;
    impl EnvVar<u32> for MaxAttempts {
        const NAME: &'static str = "LING_MAX_ATTEMPTS";
        const DEFAULT: Option<u32> = Some(3);
        const DESCRIPTION: &'static str = "Translation attempts per item before giving up";

        fn parse(value: &str) -> EnvResult<u32> {
            parse_bounded_u32(value, Self::NAME, 1, 20)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled", value),
        }),
    }
}

fn parse_bounded_u32(value: &str, var_name: &str, min: u32, max: u32) -> EnvResult<u32> {
    let num: u32 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 语言代码：2-3 个字母，可带地区后缀（zh-CN、pt-BR）
fn parse_lang(value: &str, var_name: &str) -> EnvResult<String> {
    let lang = value.trim();
    let (primary, region) = match lang.split_once('-') {
        Some((p, r)) => (p, Some(r)),
        None => (lang, None),
    };
    let primary_ok = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    let region_ok = region.map_or(true, |r| {
        (2..=4).contains(&r.len()) && r.chars().all(|c| c.is_ascii_alphanumeric())
    });

    if primary_ok && region_ok {
        Ok(lang.to_string())
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid language code '{}'", value),
        })
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    let entries: [(&str, &str); 8] = [
        (core::LogLevel::NAME, core::LogLevel::DESCRIPTION),
        (core::Developer::NAME, core::Developer::DESCRIPTION),
        (translation::TargetLang::NAME, translation::TargetLang::DESCRIPTION),
        (translation::SourceLang::NAME, translation::SourceLang::DESCRIPTION),
        (translation::ModelId::NAME, translation::ModelId::DESCRIPTION),
        (translation::ApiKey::NAME, translation::ApiKey::DESCRIPTION),
        (translation::Loading::NAME, translation::Loading::DESCRIPTION),
        (translation::MaxAttempts::NAME, translation::MaxAttempts::DESCRIPTION),
    ];
    for (name, description) in entries {
        docs.push_str(&format!("- `{}`: {}\n", name, description));
    }

    docs
}
