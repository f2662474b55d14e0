//! # 晶胞自由度过滤器
//!
//! 把原子位置和晶胞形变映射为优化器使用的广义坐标与广义力。
//!
//! - `none`: 仅原子笛卡尔坐标
//! - `hydrostatic`: 原子 + 各向同性形变 F = (1+η)I
//! - `unit_cell`: 原子 + 对称应变 F = I + ε（6 个 Voigt 分量）
//!
//! 晶胞坐标乘以 `cell_factor`（原子数），使其与原子位移量级相当。
//! 约定：cell = reference · F，r = r₀ · F，∂E/∂F = V F⁻ᵀ σ。
//!
//! ## 依赖关系
//! - 被 `optimize/mod.rs` 使用
//! - 使用 `models/linalg.rs`

use crate::error::{QeosError, Result};
use crate::models::linalg::{self, Mat3, Vec3};
use crate::models::{Crystal, Lattice, Properties};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 过滤器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// 固定晶胞，只优化原子位置
    None,
    /// 保持晶胞形状，只允许整体缩放
    #[default]
    Hydrostatic,
    /// 允许晶胞形状和体积同时变化
    UnitCell,
}

impl FromStr for FilterKind {
    type Err = QeosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" | "positions" => Ok(FilterKind::None),
            "hydrostatic" => Ok(FilterKind::Hydrostatic),
            "unit_cell" | "unitcell" => Ok(FilterKind::UnitCell),
            other => Err(QeosError::InvalidConfig(format!(
                "Unknown filter '{}'. Available: none, hydrostatic, unit_cell",
                other
            ))),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::None => write!(f, "none"),
            FilterKind::Hydrostatic => write!(f, "hydrostatic"),
            FilterKind::UnitCell => write!(f, "unit_cell"),
        }
    }
}

/// 晶胞过滤器：保存参考晶胞与当前形变
pub struct CellFilter {
    kind: FilterKind,
    reference: Mat3,
    n_atoms: usize,
    cell_factor: f64,
}

impl CellFilter {
    pub fn new(kind: FilterKind, crystal: &Crystal) -> Self {
        CellFilter {
            kind,
            reference: crystal.lattice.matrix,
            n_atoms: crystal.atoms.len(),
            cell_factor: crystal.atoms.len().max(1) as f64,
        }
    }

    fn cell_dof(&self) -> usize {
        match self.kind {
            FilterKind::None => 0,
            FilterKind::Hydrostatic => 1,
            FilterKind::UnitCell => 6,
        }
    }

    /// 当前形变梯度 F = reference⁻¹ · cell
    fn deformation(&self, crystal: &Crystal) -> Mat3 {
        match linalg::inverse(&self.reference) {
            Some(inv) => linalg::mat_mul(&inv, &crystal.lattice.matrix),
            None => linalg::IDENTITY,
        }
    }

    /// 广义坐标
    pub fn positions(&self, crystal: &Crystal) -> Vec<f64> {
        let deformation = self.deformation(crystal);
        let inv = linalg::inverse(&deformation).unwrap_or(linalg::IDENTITY);

        let mut x = Vec::with_capacity(3 * self.n_atoms + self.cell_dof());
        for r in crystal.cartesian_positions() {
            x.extend_from_slice(&linalg::vec_mat(&r, &inv));
        }

        match self.kind {
            FilterKind::None => {}
            FilterKind::Hydrostatic => {
                x.push(self.cell_factor * (deformation[0][0] - 1.0));
            }
            FilterKind::UnitCell => {
                let mut strain = deformation;
                for (k, row) in strain.iter_mut().enumerate() {
                    row[k] -= 1.0;
                }
                x.extend(linalg::matrix_to_voigt(&strain).map(|e| self.cell_factor * e));
            }
        }
        x
    }

    /// 由广义坐标更新结构
    pub fn set_positions(&self, crystal: &mut Crystal, x: &[f64]) {
        let deformation = self.deformation_from(x);
        let cell = linalg::mat_mul(&self.reference, &deformation);

        let positions: Vec<Vec3> = x[..3 * self.n_atoms]
            .chunks(3)
            .map(|r0| linalg::vec_mat(&[r0[0], r0[1], r0[2]], &deformation))
            .collect();

        crystal.lattice = Lattice::from_vectors(cell);
        crystal.set_cartesian_positions(&positions);
    }

    fn deformation_from(&self, x: &[f64]) -> Mat3 {
        let cell = &x[3 * self.n_atoms..];
        match self.kind {
            FilterKind::None => linalg::IDENTITY,
            FilterKind::Hydrostatic => {
                linalg::scale(&linalg::IDENTITY, 1.0 + cell[0] / self.cell_factor)
            }
            FilterKind::UnitCell => {
                let mut voigt = [0.0; 6];
                for (v, c) in voigt.iter_mut().zip(cell) {
                    *v = c / self.cell_factor;
                }
                let mut f = linalg::voigt_to_matrix(&voigt);
                for (k, row) in f.iter_mut().enumerate() {
                    row[k] += 1.0;
                }
                f
            }
        }
    }

    /// 广义力 = −∂E/∂x
    pub fn forces(&self, crystal: &Crystal, props: &Properties) -> Vec<f64> {
        let deformation = self.deformation(crystal);
        let transposed = linalg::transpose(&deformation);

        let mut forces = Vec::with_capacity(3 * self.n_atoms + self.cell_dof());
        for f in &props.forces {
            forces.extend_from_slice(&linalg::vec_mat(f, &transposed));
        }

        if self.kind == FilterKind::None {
            return forces;
        }

        // ∂E/∂F = V F⁻ᵀ σ
        let inv_t = linalg::transpose(&linalg::inverse(&deformation).unwrap_or(linalg::IDENTITY));
        let sigma = linalg::voigt_to_matrix(&props.stress);
        let grad = linalg::scale(&linalg::mat_mul(&inv_t, &sigma), crystal.volume());

        match self.kind {
            FilterKind::None => {}
            FilterKind::Hydrostatic => {
                let trace = grad[0][0] + grad[1][1] + grad[2][2];
                forces.push(-trace / self.cell_factor);
            }
            FilterKind::UnitCell => {
                // 非对角 Voigt 分量同时出现在矩阵的两个位置
                let d = [
                    grad[0][0],
                    grad[1][1],
                    grad[2][2],
                    grad[1][2] + grad[2][1],
                    grad[0][2] + grad[2][0],
                    grad[0][1] + grad[1][0],
                ];
                forces.extend(d.map(|g| -g / self.cell_factor));
            }
        }
        forces
    }

    /// 收敛判据：原子受力模长与晶胞分量的最大值
    pub fn max_force(&self, forces: &[f64]) -> f64 {
        let atoms = forces[..3 * self.n_atoms]
            .chunks(3)
            .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt());
        let cell = forces[3 * self.n_atoms..].iter().map(|f| f.abs());
        atoms.chain(cell).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::{Calculator, PairCalculator, PairModel, PairPotential};
    use crate::models::Atom;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn argon(a: f64) -> Crystal {
        let atoms = vec![
            Atom::new("Ar", [0.0, 0.0, 0.0]),
            Atom::new("Ar", [0.5, 0.5, 0.0]),
            Atom::new("Ar", [0.5, 0.0, 0.5]),
            Atom::new("Ar", [0.0, 0.5, 0.5]),
        ];
        let calc: Arc<dyn Calculator> = Arc::new(PairCalculator::new(
            "lj",
            PairModel::uniform(PairPotential::ARGON, 8.5),
        ));
        Crystal::new("Ar", Lattice::cubic(a), atoms).with_calculator(calc)
    }

    #[test]
    fn test_positions_round_trip() {
        for kind in [FilterKind::None, FilterKind::Hydrostatic, FilterKind::UnitCell] {
            let mut crystal = argon(5.2);
            let filter = CellFilter::new(kind, &crystal);
            let mut x = filter.positions(&crystal);
            assert_eq!(x.len(), 12 + filter.cell_dof());

            if kind != FilterKind::None {
                let last = x.len() - 1;
                x[last] += 0.02;
            }
            filter.set_positions(&mut crystal, &x);
            let again = filter.positions(&crystal);
            for (a, b) in x.iter().zip(again.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_hydrostatic_force_matches_energy_derivative() {
        let crystal = argon(5.0);
        let filter = CellFilter::new(FilterKind::Hydrostatic, &crystal);
        let props = crystal.properties().unwrap();
        let forces = filter.forces(&crystal, &props);
        let x = filter.positions(&crystal);
        let h = 1e-4;

        let energy_at = |dx: f64| {
            let mut c = crystal.clone();
            let mut y = x.clone();
            let last = y.len() - 1;
            y[last] += dx;
            filter.set_positions(&mut c, &y);
            c.potential_energy().unwrap()
        };
        let numeric = -(energy_at(h) - energy_at(-h)) / (2.0 * h);

        assert_relative_eq!(forces[12], numeric, epsilon = 1e-6);
        // 压缩的晶体倾向于膨胀
        assert!(forces[12] > 0.0);
    }

    #[test]
    fn test_filter_names() {
        assert_eq!("unit-cell".parse::<FilterKind>().unwrap(), FilterKind::UnitCell);
        assert_eq!(FilterKind::Hydrostatic.to_string(), "hydrostatic");
        assert!("frechet".parse::<FilterKind>().is_err());
    }
}
