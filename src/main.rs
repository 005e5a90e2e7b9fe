//! 命令行宿主：把整页视为可见，翻译一个 HTML 文件并输出结果

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use ling_translate::env::{core::LogLevel, generate_env_docs, EnvVar};
use ling_translate::parsers::html::{html_to_dom, serialize_document};
use ling_translate::translation::config::{ConfigManager, StaticSettings, UserSettings};
use ling_translate::translation::core::{FullPageViewport, LimiterRegistry, LogUi, OpenAiBackend, RunController};
use ling_translate::translation::logging::init_logging;
use ling_translate::translation::storage::{MemoryCacheStore, PageCache};
use ling_translate::translation::TranslationError;

#[derive(Parser)]
#[command(name = "ling-translate")]
#[command(about = "Translate the readable text of an HTML page in place")]
#[command(version)]
struct Cli {
    /// Settings file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// List the LING_* environment variables and exit
    #[arg(long)]
    env_docs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Translate an HTML file
    Translate {
        /// Input HTML file
        file: PathBuf,

        /// Target language, e.g. zh-CN
        #[arg(long)]
        to: Option<String>,

        /// Source language ('auto' for detection)
        #[arg(long)]
        from: Option<String>,

        /// Input document encoding
        #[arg(long, default_value = "utf-8")]
        encoding: String,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_config {
        return match ConfigManager::example_config_toml() {
            Ok(content) => {
                print!("{}", content);
                ExitCode::SUCCESS
            }
            Err(e) => fail(&e),
        };
    }

    if cli.env_docs {
        print!("{}", generate_env_docs());
        return ExitCode::SUCCESS;
    }

    let Some(Command::Translate {
        file,
        to,
        from,
        encoding,
        output,
    }) = cli.command
    else {
        eprintln!("Nothing to do. Try `ling-translate translate <FILE>` or `--print-config`.");
        return ExitCode::from(2);
    };

    let manager = match cli.config.as_ref() {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::new(),
    };
    let mut settings = match manager {
        Ok(manager) => manager.get_config(),
        Err(e) => return fail(&e),
    };
    if let Some(to) = to {
        settings.default_to_lang = to;
    }
    if let Some(from) = from {
        settings.default_from_lang = from;
    }

    let level = LogLevel::get().unwrap_or_else(|_| "info".to_string());
    init_logging(&settings.developer, &level);

    match translate_file(&file, &encoding, settings, output.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn translate_file(
    file: &Path,
    encoding: &str,
    settings: UserSettings,
    output: Option<&Path>,
) -> Result<(), TranslationError> {
    let data = fs::read(file)?;
    let dom = html_to_dom(&data, encoding);
    let page_url = page_url(file);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async {
        let settings = Rc::new(StaticSettings::new(settings));
        let controller = RunController::new(
            dom.document.clone(),
            settings.clone(),
            Rc::new(OpenAiBackend::new(settings)),
            Rc::new(PageCache::new(Rc::new(MemoryCacheStore::new()), page_url)),
            Rc::new(LimiterRegistry::new()),
            Rc::new(LogUi),
        );
        controller.watch_settings();

        controller.start(&FullPageViewport).await?;
        controller.until_settled().await;

        if let Some(orchestrator) = controller.orchestrator() {
            let stats = orchestrator.stats();
            tracing::info!(
                "翻译完成: 成功 {} 个，失败 {} 个，缓存命中率 {}",
                stats.succeeded,
                stats.failed,
                controller.cache_stats().rate()
            );

            let batches = orchestrator.coordinator().stats();
            tracing::debug!(
                "批次: 合并请求 {} 个，单条请求 {} 个，完整性回退 {} 次",
                batches.multi_requests,
                batches.single_requests,
                batches.integrity_failures
            );

            let errors = orchestrator.error_stats();
            if errors.total_errors > 0 {
                tracing::warn!(
                    "请求错误 {} 个（可重试 {} 个，严重 {} 个）",
                    errors.total_errors,
                    errors.retryable_errors,
                    errors.critical_errors
                );
            }
        }
        Ok::<(), TranslationError>(())
    })?;

    let html = serialize_document(&dom.document, encoding)?;
    match output {
        Some(path) => fs::write(path, html)?,
        None => io::stdout().write_all(&html)?,
    }
    Ok(())
}

fn page_url(file: &Path) -> String {
    fs::canonicalize(file)
        .ok()
        .and_then(|path| url::Url::from_file_path(path).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| file.display().to_string())
}

fn fail(error: &TranslationError) -> ExitCode {
    eprintln!("Error: {}", error);
    ExitCode::FAILURE
}
