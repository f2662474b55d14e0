//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `eos`: 状态方程计算（单文件或目录批量）
//! - `singlepoint`: 单点能量、力、应力
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: eos, single_point

pub mod eos;
pub mod single_point;

use clap::{Parser, Subcommand};

/// qeos - 状态方程计算工具
#[derive(Parser)]
#[command(name = "qeos")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Equation-of-state workflows for periodic structures", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Sample energies over a volume range and fit an equation of state
    Eos(eos::EosArgs),

    /// Evaluate energy, forces and stress of a structure or trajectory
    Singlepoint(single_point::SinglePointArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eos_command() {
        let cli = Cli::try_parse_from([
            "qeos",
            "eos",
            "NaCl.cif",
            "--arch",
            "lj",
            "--eos-type",
            "vinet",
            "--filter",
            "unit_cell",
            "--n-volumes",
            "9",
        ])
        .unwrap();

        match cli.command {
            Commands::Eos(args) => {
                assert_eq!(args.input.to_str(), Some("NaCl.cif"));
                assert_eq!(args.arch.as_deref(), Some("lj"));
                assert_eq!(args.eos_type, Some(crate::eos::EosType::Vinet));
                assert_eq!(args.filter, Some(crate::optimize::FilterKind::UnitCell));
                assert_eq!(args.n_volumes, Some(9));
                assert!(!args.no_minimize);
            }
            _ => panic!("expected eos command"),
        }
    }

    #[test]
    fn test_parse_singlepoint_command() {
        let cli = Cli::try_parse_from(["qeos", "singlepoint", "traj.xyz", "--arch", "morse"]).unwrap();
        match cli.command {
            Commands::Singlepoint(args) => assert_eq!(args.arch, "morse"),
            _ => panic!("expected singlepoint command"),
        }
    }

    #[test]
    fn test_invalid_eos_type_rejected() {
        assert!(Cli::try_parse_from(["qeos", "eos", "a.cif", "--eos-type", "bm3"]).is_err());
    }
}
