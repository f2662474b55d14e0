//! # 批量处理模块
//!
//! 对目录中的多个结构文件并行运行 EoS 工作流。
//!
//! ## 功能
//! - 自动检测输入类型（文件/目录）
//! - 收集匹配文件列表
//! - 并行处理
//! - 进度反馈、统计与 CSV 汇总
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;
pub mod summary;

pub use collector::FileCollector;
pub use runner::{BatchRunner, ProcessResult};
pub use summary::{write_summary, EosSummary};
