//! 日志系统模块职责：
//! 1. 初始化 stdout + 文件双通道 tracing 日志。
//! 2. 文件日志按天滚动，落在 `AG_LOG_DIR` 目录。
//! 3. 启动时清理超过保留天数的历史日志文件。

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// 默认日志目录（相对当前工作目录）。
const DEFAULT_LOG_DIR: &str = "logs";
/// 日志目录环境变量。
const LOG_DIR_ENV: &str = "AG_LOG_DIR";
/// 文件日志级别环境变量（独立于 `RUST_LOG`）。
const FILE_LOG_LEVEL_ENV: &str = "AG_FILE_LOG_LEVEL";
/// 日志保留天数环境变量。
const LOG_RETENTION_DAYS_ENV: &str = "AG_LOG_RETENTION_DAYS";
/// 默认保留天数。
const DEFAULT_LOG_RETENTION_DAYS: i64 = 14;
/// stdout 默认日志过滤。
const DEFAULT_STDOUT_FILTER: &str = "info";

/// 日志运行时守卫，防止 non-blocking writer 提前析构。
pub(crate) struct LogRuntime {
    _stdout_guard: WorkerGuard,
    _file_guard: WorkerGuard,
}

/// 初始化 gateway 日志系统。
pub(crate) fn init(service_name: &str) -> Result<LogRuntime> {
    let log_dir = resolve_log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout_writer)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(resolve_stdout_env_filter());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(resolve_file_level_filter());

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let today = Local::now().date_naive();
    match prune_expired_logs(&log_dir, today, retention_days()) {
        Ok(0) => {}
        Ok(removed) => debug!("pruned {removed} expired log files"),
        Err(err) => warn!("prune logs failed: {err}"),
    }

    Ok(LogRuntime {
        _stdout_guard: stdout_guard,
        _file_guard: file_guard,
    })
}

/// 解析 stdout 日志过滤规则：优先 `RUST_LOG`，回退默认级别。
fn resolve_stdout_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER))
}

/// 解析文件日志级别；默认 `debug`，鉴权拒绝的内部原因只在该级别可见。
fn resolve_file_level_filter() -> LevelFilter {
    std::env::var(FILE_LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::DEBUG)
}

/// 将环境变量中的日志路径解析成绝对路径。
fn resolve_log_dir() -> PathBuf {
    let raw = std::env::var(LOG_DIR_ENV).unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(dir) => dir.join(path),
        Err(_) => PathBuf::from(DEFAULT_LOG_DIR),
    }
}

/// 读取保留天数；0 表示不清理。
fn retention_days() -> i64 {
    std::env::var(LOG_RETENTION_DAYS_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|days| *days >= 0)
        .unwrap_or(DEFAULT_LOG_RETENTION_DAYS)
}

/// 删除日期早于 `today - keep_days` 的滚动日志，返回删除数量。
fn prune_expired_logs(log_dir: &Path, today: NaiveDate, keep_days: i64) -> Result<usize> {
    if keep_days == 0 || !log_dir.exists() {
        return Ok(0);
    }
    let cutoff = today - Duration::days(keep_days);

    let mut removed = 0;
    for entry in
        fs::read_dir(log_dir).with_context(|| format!("read log dir: {}", log_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry under {}", log_dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(day) = path
            .file_name()
            .and_then(|value| value.to_str())
            .and_then(extract_day_from_log_name)
        else {
            continue;
        };
        if day < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// 从滚动日志文件名中提取日期（`<name>.log.YYYY-MM-DD`）。
fn extract_day_from_log_name(file_name: &str) -> Option<NaiveDate> {
    let day = file_name.rsplit('.').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;

    use super::{extract_day_from_log_name, prune_expired_logs};

    #[test]
    fn log_names_without_a_date_suffix_are_ignored() {
        assert_eq!(
            extract_day_from_log_name("gateway.log.2026-03-01"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(extract_day_from_log_name("gateway.log"), None);
        assert_eq!(extract_day_from_log_name("notes.txt"), None);
    }

    #[test]
    fn prune_keeps_recent_and_foreign_files() {
        let dir = std::env::temp_dir().join(format!("ag-log-prune-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("dir");
        for name in [
            "gateway.log.2026-01-01",
            "gateway.log.2026-01-20",
            "gateway.log.2026-01-28",
            "README",
        ] {
            fs::write(dir.join(name), b"x").expect("write");
        }

        let today = NaiveDate::from_ymd_opt(2026, 1, 30).expect("date");
        assert_eq!(prune_expired_logs(&dir, today, 7).expect("prune"), 2);
        assert!(dir.join("gateway.log.2026-01-28").exists());
        assert!(dir.join("README").exists());
        assert_eq!(prune_expired_logs(&dir, today, 0).expect("noop"), 0);

        let _ = fs::remove_dir_all(&dir);
    }
}
