//! # 运行日志
//!
//! 计算过程中的 `tracing` 事件写入日志文件。
//! 日志订阅者只在一次运行期间生效（`with_default`），
//! 批量模式下各线程、各次运行互不干扰；文件以追加方式打开，
//! 离开作用域即关闭。
//!
//! ## 依赖关系
//! - 被 `eos/`、`single_point.rs` 使用
//! - 使用 `tracing`、`tracing-subscriber`

use crate::error::{QeosError, Result};

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 日志文件；为空时沿用全局订阅者
    pub filename: Option<PathBuf>,
    /// 最低记录级别 (error/warn/info/debug/trace)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filename: None,
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.level).map_err(|_| {
            QeosError::InvalidConfig(format!(
                "Invalid log level '{}'. Available: error, warn, info, debug, trace",
                self.level
            ))
        })
    }
}

/// 一次运行的日志作用域
pub struct RunLogger {
    dispatch: Option<Dispatch>,
}

impl RunLogger {
    /// 打开日志文件；未配置文件时返回空作用域
    pub fn open(config: &LogConfig) -> Result<Self> {
        let level = config.level_filter()?;
        let Some(path) = &config.filename else {
            return Ok(RunLogger { dispatch: None });
        };

        let file = open_append(path)?;
        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_max_level(level)
            .finish();

        Ok(RunLogger {
            dispatch: Some(Dispatch::new(subscriber)),
        })
    }

    /// 在日志作用域内执行
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(QeosError::DirectoryNotFound {
                path: parent.display().to_string(),
            });
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| QeosError::write_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_log(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("qeos-logging-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn test_events_written_to_file() {
        let path = temp_log("scoped.log");
        let logger = RunLogger::open(&LogConfig::default().with_filename(&path)).unwrap();
        logger.in_scope(|| {
            tracing::info!("Using filter: hydrostatic");
            tracing::debug!("below threshold");
        });
        drop(logger);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Using filter: hydrostatic"));
        assert!(!content.contains("below threshold"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_reopen_appends() {
        let path = temp_log("append.log");
        for msg in ["first run", "second run"] {
            let logger = RunLogger::open(&LogConfig::default().with_filename(&path)).unwrap();
            logger.in_scope(|| tracing::info!("{}", msg));
        }
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first run") && content.contains("second run"));
    }

    #[test]
    fn test_invalid_level() {
        let config = LogConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(RunLogger::open(&config).is_err());
    }

    #[test]
    fn test_missing_directory() {
        let config = LogConfig::default().with_filename("/nonexistent/dir/run.log");
        let err = RunLogger::open(&config).err().unwrap();
        assert!(matches!(err, QeosError::DirectoryNotFound { .. }));
    }
}
