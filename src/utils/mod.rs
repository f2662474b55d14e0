//! # 工具函数模块
//!
//! 提供美化输出、进度条、运行日志与碳排放估计。
//!
//! ## 依赖关系
//! - 被 `commands/`、`eos/`、`single_point.rs` 使用
//! - 子模块: emissions, logging, output, progress

pub mod emissions;
pub mod logging;
pub mod output;
pub mod progress;
