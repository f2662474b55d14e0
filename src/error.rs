//! # 统一错误处理模块
//!
//! 定义 qeos 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// qeos 统一错误类型
#[derive(Error, Debug)]
pub enum QeosError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 工作流错误
    // ─────────────────────────────────────────────────────────────
    /// 结构未附加计算器，且未指定架构
    #[error("A calculator must be attached to the structure, or an architecture must be specified")]
    MissingCalculator,

    /// 输入合法但尚不支持（如多帧轨迹）
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// 结构参数既不是可读文件，也不是内存结构
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Architecture '{arch}' is recognised but has no native backend in qeos; attach a custom calculator instead")]
    UnsupportedArchitecture { arch: String },

    #[error("Invalid model file: {path}\nReason: {reason}")]
    ModelFormat { path: String, reason: String },

    #[error("Calculation failed: {0}")]
    CalculationFailed(String),

    #[error("Equation of state fit failed: {0}")]
    FitFailed(String),

    // ─────────────────────────────────────────────────────────────
    // 输出错误
    // ─────────────────────────────────────────────────────────────
    #[error("Plotting failed: {0}")]
    PlotError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Failed to load configuration: {path}\nReason: {reason}")]
    ConfigError { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

impl QeosError {
    /// 文件写入错误的便捷构造
    pub fn write_error(path: &std::path::Path, source: std::io::Error) -> Self {
        QeosError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 文件读取错误的便捷构造
    pub fn read_error(path: &std::path::Path, source: std::io::Error) -> Self {
        QeosError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, QeosError>;
