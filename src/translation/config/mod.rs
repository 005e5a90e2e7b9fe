//! 翻译配置管理模块
//!
//! 用户设置模型、配置文件加载与环境变量覆盖

pub mod manager;
pub mod settings;

// 重新导出主要类型
pub use manager::ConfigManager;
pub use settings::{
    ApiConfig, DeveloperSettings, EngineSettings, LoadingStyle, ModelConfig, ModelLimits,
    SettingsProvider, StaticSettings, UserSettings,
};

/// 配置常量
pub mod constants {
    // 扫描相关
    /// 排除的元素（取各来源的并集），整棵子树都会被跳过
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "code", "pre", "textarea", "input", "select",
        "option", "svg", "path", "math", "canvas", "img", "picture", "video", "audio",
        "source", "track", "iframe", "frame", "object", "embed", "template", "head",
        "meta", "link",
    ];
    pub const DEFAULT_SCAN_SLICE_MS: u64 = 12;
    /// 每访问多少个节点检查一次时间片
    pub const SCAN_CHECK_INTERVAL: usize = 64;

    // DOM 标记
    pub const ATTR_TRANSLATED: &str = "data-translated";
    pub const ATTR_TRANSLATED_LANG: &str = "data-translated-lang";
    pub const ATTR_LOADING: &str = "data-translate-loading";
    pub const ATTR_ERROR: &str = "data-translate-error";
    pub const ATTR_TITLE: &str = "title";
    pub const ATTR_CLASS: &str = "class";
    pub const ATTR_CONTENT_EDITABLE: &str = "contenteditable";
    pub const CLASS_ERROR: &str = "ling-translate-error";
    pub const CLASS_SPINNER: &str = "ling-translate-spinner";
    pub const LOADING_TEXT: &str = "…";

    // 批次
    /// 多段请求的分隔符
    pub const MULTI_SEPARATOR: &str = "%%";
    pub const MULTI_JOINER: &str = "\n\n%%\n\n";

    // 缓存
    pub const PAGE_CACHE_PREFIX: &str = "ling_page_cache_";
    /// 会话存储的典型配额（字节）
    pub const DEFAULT_STORE_QUOTA_BYTES: usize = 5 * 1024 * 1024;

    // 模型默认值
    pub const DEFAULT_CONCURRENCY: u32 = 4;
    pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 12;
    pub const DEFAULT_MAX_PARAGRAPHS: usize = 50;
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;

    // 编排
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
    pub const DEFAULT_BACKOFF_CAP: u32 = 5;
    pub const DEFAULT_MIN_LOADING_MS: u64 = 200;
    pub const DEFAULT_LOOKAHEAD_PX: u32 = 200;

    // 语言
    pub const DEFAULT_FROM_LANG: &str = "auto";
    pub const DEFAULT_TO_LANG: &str = "zh-CN";

    /// 语言代码到提示词中使用的名称
    pub const LANG_CODE_TO_NAME: &[(&str, &str)] = &[
        ("zh-CN", "Chinese (Simplified)"),
        ("en", "English"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("fr", "French"),
        ("de", "German"),
        ("es", "Spanish"),
        ("auto", "auto-detect"),
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "ling-translate.toml",
        ".ling-translate.toml",
        "ling-translate.json",
        "~/.config/ling-translate/settings.toml",
        "/etc/ling-translate/settings.toml",
    ];
}

/// 语言代码对应的显示名称，未知代码原样返回
pub fn language_name(code: &str) -> &str {
    constants::LANG_CODE_TO_NAME
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("zh-CN"), "Chinese (Simplified)");
        assert_eq!(language_name("auto"), "auto-detect");
        assert_eq!(language_name("pt-BR"), "pt-BR");
    }
}
