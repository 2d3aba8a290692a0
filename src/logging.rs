use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// sled 与 cron 调度器在 debug 级别下过于嘈杂
const QUIET_DEPENDENCIES: &[&str] = &["sled=warn", "tokio_cron_scheduler=warn"];

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&crate::config::Config> for LogConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

/// `RUST_LOG` 优先；否则使用配置的级别并压低依赖库的日志。
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()));
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_tracing(config: &LogConfig) {
    let registry = Registry::default()
        .with(build_filter(&config.log_level))
        .with(fmt::layer().with_target(true).with_thread_ids(false));

    let outcome = if config.enable_file_logs {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("adaptive-review")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&config.log_dir)
            .expect("Failed to create rolling file appender for review logs");
        registry
            .with(fmt::layer().with_writer(appender).with_ansi(false).json())
            .try_init()
    } else {
        registry.try_init()
    };

    // 已有全局 subscriber（宿主程序或前一个测试）可以接受，其余失败直接终止。
    if let Err(e) = outcome {
        if !e.to_string().contains("already been set") {
            panic!("Failed to initialize tracing: {e}");
        }
    }
}
