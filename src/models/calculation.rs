//! # 计算结果数据模型
//!
//! 存储一次单点计算得到的能量、力和应力。
//!
//! ## 依赖关系
//! - 被 `calculators/` 产生
//! - 被 `optimize/`, `eos/`, `single_point.rs` 使用

use crate::models::linalg::Vec3;

use serde::{Deserialize, Serialize};

/// 单点计算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// 势能 (eV)
    pub energy: f64,

    /// 每个原子受力 (eV/Å)
    pub forces: Vec<Vec3>,

    /// 应力，Voigt 记号 (xx, yy, zz, yz, xz, xy)，单位 eV/Å³
    /// 约定 σ = (1/V) ∂E/∂ε，拉伸为正
    pub stress: [f64; 6],
}

impl Properties {
    /// 最大原子受力模长
    pub fn max_force(&self) -> f64 {
        self.forces
            .iter()
            .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
            .fold(0.0, f64::max)
    }

    /// 静水压 (eV/Å³)，压缩为正
    pub fn pressure(&self) -> f64 {
        -(self.stress[0] + self.stress[1] + self.stress[2]) / 3.0
    }

    /// 每原子能量
    pub fn energy_per_atom(&self) -> Option<f64> {
        match self.forces.len() {
            0 => None,
            n => Some(self.energy / n as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_force_and_pressure() {
        let props = Properties {
            energy: -8.0,
            forces: vec![[3.0, 4.0, 0.0], [0.0, 0.0, 1.0]],
            stress: [-0.3, -0.3, -0.3, 0.0, 0.0, 0.0],
        };

        assert!((props.max_force() - 5.0).abs() < 1e-12);
        assert!((props.pressure() - 0.3).abs() < 1e-12);
        assert_eq!(props.energy_per_atom(), Some(-4.0));
    }
}
