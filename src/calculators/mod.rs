//! # 计算器模块
//!
//! 定义能量/力/应力计算接口，以及按架构名称构造计算器的注册表。
//!
//! ## 架构名称
//! - `lj` / `lennard_jones`: Lennard-Jones 对势（默认 Ar 参数）
//! - `morse`: Morse 对势（默认 Cu 参数）
//! - `buckingham`: Buckingham 对势（需要模型文件）
//! - `pair`: 混合对势（需要模型文件）
//! - MLIP 名称 (`mace_mp`, `chgnet`, ...) 可识别，但没有原生后端
//!
//! ## 依赖关系
//! - 被 `models/structure.rs`, `eos/`, `single_point.rs` 使用
//! - 子模块: pair

pub mod pair;

pub use pair::{PairCalculator, PairModel, PairPotential};

use crate::error::{QeosError, Result};
use crate::models::{Crystal, Properties};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// 能量、力与应力的计算接口
///
/// 实现必须线程安全：批量模式下不同结构在不同线程上计算。
pub trait Calculator: Send + Sync + fmt::Debug {
    /// 计算器名称，用于日志
    fn name(&self) -> &str;

    /// 计算给定结构的能量、力和应力
    fn calculate(&self, crystal: &Crystal) -> Result<Properties>;
}

/// 已识别但没有原生实现的 MLIP 架构
const MLIP_ARCHITECTURES: [&str; 11] = [
    "mace",
    "mace_mp",
    "mace_off",
    "chgnet",
    "sevennet",
    "m3gnet",
    "alignn",
    "nequip",
    "dpa3",
    "orb",
    "mattersim",
];

/// 计算器架构
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Architecture {
    LennardJones,
    Morse,
    Buckingham,
    Pair,
    /// 已知的 MLIP 架构名称
    Mlip(String),
}

impl FromStr for Architecture {
    type Err = QeosError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase().replace('-', "_");
        match name.as_str() {
            "lj" | "lennard_jones" | "lennardjones" => Ok(Architecture::LennardJones),
            "morse" => Ok(Architecture::Morse),
            "buckingham" => Ok(Architecture::Buckingham),
            "pair" => Ok(Architecture::Pair),
            other if MLIP_ARCHITECTURES.contains(&other) => {
                Ok(Architecture::Mlip(other.to_string()))
            }
            _ => Err(QeosError::InvalidConfig(format!(
                "Unknown architecture '{}'. Available: lj, morse, buckingham, pair",
                s
            ))),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::LennardJones => write!(f, "lj"),
            Architecture::Morse => write!(f, "morse"),
            Architecture::Buckingham => write!(f, "buckingham"),
            Architecture::Pair => write!(f, "pair"),
            Architecture::Mlip(name) => write!(f, "{}", name),
        }
    }
}

/// 计算设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    Mps,
    Xpu,
}

impl FromStr for Device {
    type Err = QeosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            "xpu" => Ok(Device::Xpu),
            other => Err(QeosError::InvalidConfig(format!(
                "Unknown device '{}'. Available: cpu, cuda, mps, xpu",
                other
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
            Device::Mps => write!(f, "mps"),
            Device::Xpu => write!(f, "xpu"),
        }
    }
}

/// 计算器规格：架构 + 模型 + 设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorSpec {
    pub arch: String,
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default)]
    pub device: Device,
}

impl CalculatorSpec {
    pub fn new(arch: impl Into<String>) -> Self {
        CalculatorSpec {
            arch: arch.into(),
            model: None,
            device: Device::Cpu,
        }
    }

    pub fn with_model(mut self, model: impl Into<PathBuf>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// 按规格构造计算器
    pub fn build(&self) -> Result<Arc<dyn Calculator>> {
        choose_calculator(&self.arch, self.model.as_deref(), self.device)
    }
}

/// 按架构名称构造计算器
///
/// 模型文件的读取与格式错误原样返回给调用者。
pub fn choose_calculator(
    arch: &str,
    model: Option<&Path>,
    device: Device,
) -> Result<Arc<dyn Calculator>> {
    let architecture: Architecture = arch.parse()?;

    if let Architecture::Mlip(name) = &architecture {
        return Err(QeosError::UnsupportedArchitecture { arch: name.clone() });
    }

    if device != Device::Cpu {
        return Err(QeosError::InvalidConfig(format!(
            "Device '{}' is not supported by the '{}' calculator; use cpu",
            device, architecture
        )));
    }

    let model = match (model, &architecture) {
        (Some(path), _) => PairModel::from_file(path)?,
        (None, Architecture::LennardJones) => PairModel::uniform(PairPotential::ARGON, 8.5),
        (None, Architecture::Morse) => PairModel::uniform(PairPotential::COPPER, 7.0),
        (None, _) => {
            return Err(QeosError::InvalidConfig(format!(
                "Architecture '{}' requires a model file",
                architecture
            )))
        }
    };

    Ok(Arc::new(PairCalculator::new(architecture.to_string(), model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_names() {
        assert_eq!("LJ".parse::<Architecture>().unwrap(), Architecture::LennardJones);
        assert_eq!(
            "lennard-jones".parse::<Architecture>().unwrap(),
            Architecture::LennardJones
        );
        assert_eq!(
            "mace_mp".parse::<Architecture>().unwrap(),
            Architecture::Mlip("mace_mp".to_string())
        );
        assert!("not_a_potential".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_choose_builtin_calculator() {
        let calc = choose_calculator("lj", None, Device::Cpu).unwrap();
        assert_eq!(calc.name(), "lj");
    }

    #[test]
    fn test_mlip_architecture_is_unsupported() {
        for arch in ["chgnet", "sevennet", "m3gnet", "alignn"] {
            let err = choose_calculator(arch, None, Device::Cpu).unwrap_err();
            assert!(matches!(err, QeosError::UnsupportedArchitecture { .. }));
        }
    }

    #[test]
    fn test_gpu_device_rejected() {
        let err = choose_calculator("lj", None, Device::Cuda).unwrap_err();
        assert!(matches!(err, QeosError::InvalidConfig(_)));
    }

    #[test]
    fn test_buckingham_requires_model() {
        let err = choose_calculator("buckingham", None, Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("requires a model file"));
    }

    #[test]
    fn test_missing_model_file_propagates() {
        let err = choose_calculator("pair", Some(Path::new("/nonexistent/model.toml")), Device::Cpu)
            .unwrap_err();
        assert!(matches!(err, QeosError::FileReadError { .. }));
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert!("tpu".parse::<Device>().is_err());
    }
}
