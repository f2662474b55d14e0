//! # qeos - 状态方程计算工具
//!
//! 对周期性结构在一组体积下计算能量，拟合状态方程，
//! 得到体弹模量、平衡能量和平衡体积。
//!
//! ## 子命令
//! - `eos`         - 状态方程工作流（单文件或目录批量）
//! - `singlepoint` - 单点能量、力、应力
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/          (命令行参数定义)
//!   ├── commands/     (命令执行逻辑)
//!   │     ├── eos/          (采样、拟合、输出)
//!   │     ├── optimize/     (几何优化)
//!   │     ├── calculators/  (能量、力、应力)
//!   │     ├── parsers/      (格式解析器)
//!   │     └── models/       (数据模型)
//!   ├── batch/        (并行批量处理)
//!   ├── utils/        (日志、排放估算、输出)
//!   └── error.rs      (错误处理)
//! ```

mod batch;
mod calculators;
mod cli;
mod commands;
mod config;
mod eos;
mod error;
mod models;
mod optimize;
mod parsers;
mod single_point;
mod utils;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    // 运行期间的事件写入各自的日志文件，此处只处理 RUST_LOG 指定的诊断输出
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
