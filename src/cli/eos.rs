//! # eos 子命令 CLI 定义
//!
//! 未给出的数值参数沿用配置文件（`--config`）或默认值，
//! 给出的参数覆盖配置文件。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/eos.rs`

use crate::calculators::Device;
use crate::eos::EosType;
use crate::optimize::{FilterKind, OptimizerKind};
use crate::parsers::DEFAULT_PATTERN;

use clap::Args;
use std::path::PathBuf;

/// eos 子命令参数
#[derive(Args, Debug)]
pub struct EosArgs {
    /// Input: structure file or directory containing structure files
    pub input: PathBuf,

    /// TOML run configuration; command-line flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // 计算器
    // ─────────────────────────────────────────────────────────────
    /// Calculator architecture (lj, morse, buckingham, pair)
    #[arg(long)]
    pub arch: Option<String>,

    /// Model file for the calculator (TOML pair-potential model)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Device to run the calculator on
    #[arg(long)]
    pub device: Option<Device>,

    // ─────────────────────────────────────────────────────────────
    // 体积采样与拟合
    // ─────────────────────────────────────────────────────────────
    /// Lowest volume as a fraction of the initial volume
    #[arg(long)]
    pub min_volume: Option<f64>,

    /// Highest volume as a fraction of the initial volume
    #[arg(long)]
    pub max_volume: Option<f64>,

    /// Number of volumes to sample
    #[arg(long)]
    pub n_volumes: Option<usize>,

    /// Equation of state to fit (birchmurnaghan, vinet, murnaghan, ...)
    #[arg(long)]
    pub eos_type: Option<EosType>,

    // ─────────────────────────────────────────────────────────────
    // 几何优化
    // ─────────────────────────────────────────────────────────────
    /// Skip the initial geometry optimization
    #[arg(long, default_value_t = false)]
    pub no_minimize: bool,

    /// Relax atomic positions at every sampled volume
    #[arg(long, default_value_t = false)]
    pub minimize_all: bool,

    /// Force convergence criterion in eV/Å
    #[arg(long)]
    pub fmax: Option<f64>,

    /// Maximum number of optimizer steps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Cell filter for the initial optimization (none, hydrostatic, unit_cell)
    #[arg(long)]
    pub filter: Option<FilterKind>,

    /// Optimizer (fire, steepest_descent)
    #[arg(long)]
    pub optimizer: Option<OptimizerKind>,

    // ─────────────────────────────────────────────────────────────
    // 输出
    // ─────────────────────────────────────────────────────────────
    /// Prefix for output files (default: input path without extension);
    /// in batch mode, a directory receiving <stem>-* files
    #[arg(long)]
    pub file_prefix: Option<PathBuf>,

    /// Log file (default: <prefix>-eos-log.log)
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Plot the fitted E(V) curve
    #[arg(long, default_value_t = false)]
    pub plot: bool,

    /// Plot file (default: <prefix>-eos-plot.svg; .png for bitmap)
    #[arg(long)]
    pub plot_file: Option<PathBuf>,

    /// Write every sampled structure to <prefix>-generated.extxyz
    #[arg(long, default_value_t = false)]
    pub write_structures: bool,

    /// Disable the carbon emissions estimate
    #[arg(long, default_value_t = false)]
    pub no_tracker: bool,

    // ─────────────────────────────────────────────────────────────
    // 批量处理选项
    // ─────────────────────────────────────────────────────────────
    /// File pattern for batch mode (comma-separated globs)
    #[arg(short, long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Number of parallel jobs (0 = all CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Search subdirectories recursively
    #[arg(short = 'R', long, default_value_t = false)]
    pub recursive: bool,

    /// Recompute structures whose fit file already exists
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
