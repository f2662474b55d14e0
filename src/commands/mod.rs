//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `eos/`, `single_point.rs`, `batch/`, `utils/`
//! - 子模块: eos, single_point

pub mod eos;
pub mod single_point;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Eos(args) => eos::execute(args),
        Commands::Singlepoint(args) => single_point::execute(args),
    }
}
