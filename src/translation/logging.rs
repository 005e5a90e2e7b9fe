//! 日志初始化
//!
//! 引擎按类别写日志：`ling_translate::dom`、`ling_translate::translation`、
//! `ling_translate::network`。开发者模式下被勾选的类别提升到 debug。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::translation::config::DeveloperSettings;

pub const TARGET_DOM: &str = "ling_translate::dom";
pub const TARGET_TRANSLATION: &str = "ling_translate::translation";
pub const TARGET_NETWORK: &str = "ling_translate::network";

/// 根据基础级别与开发者设置生成过滤指令
pub fn filter_directives(developer: &DeveloperSettings, base_level: &str) -> String {
    let mut directives = vec![base_level.to_string()];
    if developer.enabled {
        let categories = [
            (developer.log_dom, TARGET_DOM),
            (developer.log_translation, TARGET_TRANSLATION),
            (developer.log_network, TARGET_NETWORK),
        ];
        for (enabled, target) in categories {
            if enabled {
                directives.push(format!("{}=debug", target));
            }
        }
    }
    directives.join(",")
}

/// 安装全局订阅者；`RUST_LOG` 优先，已安装时静默返回
pub fn init_logging(developer: &DeveloperSettings, base_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(developer, base_level)));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();

    if result.is_err() {
        tracing::debug!("日志订阅者已存在，跳过初始化");
    }
}
