//! # singlepoint 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/single_point.rs`

use crate::calculators::Device;

use clap::Args;
use std::path::PathBuf;

/// singlepoint 子命令参数
#[derive(Args, Debug)]
pub struct SinglePointArgs {
    /// Input structure file; multi-frame XYZ files are evaluated frame by frame
    pub input: PathBuf,

    /// Calculator architecture (lj, morse, buckingham, pair)
    #[arg(long)]
    pub arch: String,

    /// Model file for the calculator (TOML pair-potential model)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Device to run the calculator on
    #[arg(long, default_value_t = Device::Cpu)]
    pub device: Device,
}
