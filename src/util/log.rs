use crate::util::config::LoggingConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 按配置初始化日志：控制台 + 按天滚动的文件（可选 JSON）
///
/// 返回的 guard 必须在进程生命周期内持有，否则文件日志会丢失尾部内容
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level);
    let use_json = config.structured.unwrap_or(false);

    // RUST_LOG 优先于配置
    let make_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(level_filter)))
    };

    let stdout_layer: BoxedLayer = if use_json {
        layer()
            .json()
            .with_target(true)
            .with_writer(io::stdout)
            .with_filter(make_filter())
            .boxed()
    } else {
        layer()
            .with_target(false)
            .with_writer(io::stdout)
            .with_filter(make_filter())
            .boxed()
    };

    let mut layers = vec![stdout_layer];
    let mut guard = None;
    let mut log_dir = None;

    if config.file.enabled {
        let dir = resolve_log_dir(&config.file.directory);
        std::fs::create_dir_all(&dir)?;

        let (writer, file_guard) = tracing_appender::non_blocking(daily(&dir, file_prefix));
        let file_layer: BoxedLayer = if use_json {
            layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(make_filter())
                .boxed()
        } else {
            layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(make_filter())
                .boxed()
        };
        layers.push(file_layer);
        guard = Some(file_guard);
        log_dir = Some(dir);
    }

    Registry::default().with(layers).try_init()?;

    tracing::info!(
        event = "log.init",
        level = %config.level,
        structured = use_json,
        file = config.file.enabled,
        directory = %log_dir.as_deref().map(|d| d.display().to_string()).unwrap_or_default()
    );

    if let (Some(dir), Some(days)) = (log_dir.as_deref(), config.file.retention_days) {
        if let Err(e) = cleanup_old_logs(dir, file_prefix, days) {
            tracing::warn!("日志清理失败: {}", e);
        }
    }

    Ok(guard)
}

/// 仅控制台输出，供命令行单次模式使用
pub fn log_init_console(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(parse_level(level))));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// 相对路径基于工作目录；在 bin/ 下运行时改用上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(path);
        }
    }
    current_dir.join(path)
}

/// 删除超过保留天数、且以 `file_prefix` 开头的日志文件
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let now = std::time::SystemTime::now();
    let mut deleted = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(file_prefix));
        if !is_log {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            match std::fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!("删除日志文件失败: {} - {}", path.display(), e),
            }
        }
    }

    if deleted > 0 {
        tracing::info!(event = "log.cleanup", deleted, retention_days);
    }
    Ok(deleted)
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), LevelFilter::INFO);
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
    }

    #[test]
    fn cleanup_only_touches_prefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lab-interpreter.2020-01-01"), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        // 保留 0 天：所有带前缀的文件都算过期（mtime 早于 now）
        std::thread::sleep(std::time::Duration::from_millis(20));
        let deleted = cleanup_old_logs(dir.path(), "lab-interpreter", 0).unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("notes.txt").exists());
    }
}
