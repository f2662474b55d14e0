//! # 晶体结构数据模型
//!
//! 定义统一的晶体结构表示。结构可以附加一个计算器，用于计算能量、
//! 力和应力；`info` 保存运行过程中产生的辅助数据（如 `emissions`）。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculators/`, `optimize/`, `eos/` 使用
//! - 使用 `models/linalg.rs` 和 `calculators::Calculator`

use crate::calculators::Calculator;
use crate::error::{QeosError, Result};
use crate::models::linalg::{self, Mat3, Vec3};
use crate::models::Properties;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    /// [[a1, a2, a3], [b1, b2, b3], [c1, c2, c3]]
    pub matrix: Mat3,
}

impl Lattice {
    /// 从晶格参数 (a, b, c, alpha, beta, gamma) 创建晶格
    /// 角度单位：度
    pub fn from_parameters(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3 = (c * c - c1 * c1 - c2 * c2).sqrt();

        Lattice {
            matrix: [
                [a, 0.0, 0.0],
                [b * cos_gamma, b * sin_gamma, 0.0],
                [c1, c2, c3],
            ],
        }
    }

    /// 从晶格向量矩阵创建
    pub fn from_vectors(matrix: Mat3) -> Self {
        Lattice { matrix }
    }

    /// 立方晶格
    pub fn cubic(a: f64) -> Self {
        Lattice::from_vectors([[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]])
    }

    /// 获取晶格参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a_vec, b_vec, c_vec] = self.matrix;
        let a = linalg::norm(&a_vec);
        let b = linalg::norm(&b_vec);
        let c = linalg::norm(&c_vec);

        let alpha = (linalg::dot(&b_vec, &c_vec) / (b * c)).acos().to_degrees();
        let beta = (linalg::dot(&a_vec, &c_vec) / (a * c)).acos().to_degrees();
        let gamma = (linalg::dot(&a_vec, &b_vec) / (a * b)).acos().to_degrees();

        (a, b, c, alpha, beta, gamma)
    }

    /// 晶格体积（带符号的行列式）
    pub fn volume(&self) -> f64 {
        linalg::det(&self.matrix)
    }

    /// 三个方向的晶面间距 d_i = V / |a_j × a_k|
    pub fn plane_spacings(&self) -> Vec3 {
        let [a, b, c] = self.matrix;
        let volume = self.volume().abs();
        [
            volume / linalg::norm(&linalg::cross(&b, &c)),
            volume / linalg::norm(&linalg::cross(&a, &c)),
            volume / linalg::norm(&linalg::cross(&a, &b)),
        ]
    }

    /// 分数坐标转笛卡尔坐标
    pub fn frac_to_cart(&self, frac: &Vec3) -> Vec3 {
        linalg::vec_mat(frac, &self.matrix)
    }

    /// 笛卡尔坐标转分数坐标，奇异晶格时原样返回
    pub fn cart_to_frac(&self, cart: &Vec3) -> Vec3 {
        match linalg::inverse(&self.matrix) {
            Some(inv) => linalg::vec_mat(cart, &inv),
            None => *cart,
        }
    }
}

/// 原子信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: Vec3,
}

impl Atom {
    pub fn new(element: impl Into<String>, position: Vec3) -> Self {
        Atom {
            element: element.into(),
            position,
        }
    }
}

/// 晶体结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,

    /// 三个晶格方向是否周期
    pub pbc: [bool; 3],

    /// 辅助数据（能量、碳排放估计等）
    pub info: BTreeMap<String, f64>,

    /// 来源文件格式
    pub source_format: Option<String>,

    /// 附加的计算器
    #[serde(skip)]
    calculator: Option<Arc<dyn Calculator>>,
}

impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
            pbc: [true; 3],
            info: BTreeMap::new(),
            source_format: None,
            calculator: None,
        }
    }

    /// 附加计算器（替换已有的）
    pub fn attach_calculator(&mut self, calculator: Arc<dyn Calculator>) {
        self.calculator = Some(calculator);
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn Calculator>) -> Self {
        self.attach_calculator(calculator);
        self
    }

    pub fn calculator(&self) -> Option<&Arc<dyn Calculator>> {
        self.calculator.as_ref()
    }

    pub fn has_calculator(&self) -> bool {
        self.calculator.is_some()
    }

    /// 计算化学式
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 晶胞体积 (Å³)
    pub fn volume(&self) -> f64 {
        self.lattice.volume().abs()
    }

    /// 笛卡尔坐标列表
    pub fn cartesian_positions(&self) -> Vec<Vec3> {
        self.atoms
            .iter()
            .map(|atom| self.lattice.frac_to_cart(&atom.position))
            .collect()
    }

    /// 用笛卡尔坐标更新原子位置
    pub fn set_cartesian_positions(&mut self, positions: &[Vec3]) {
        for (atom, cart) in self.atoms.iter_mut().zip(positions) {
            atom.position = self.lattice.cart_to_frac(cart);
        }
    }

    /// 设置晶胞；`scale_atoms` 为 true 时保持分数坐标，否则保持笛卡尔坐标
    pub fn set_cell(&mut self, matrix: Mat3, scale_atoms: bool) {
        if scale_atoms {
            self.lattice = Lattice::from_vectors(matrix);
        } else {
            let positions = self.cartesian_positions();
            self.lattice = Lattice::from_vectors(matrix);
            self.set_cartesian_positions(&positions);
        }
    }

    /// 各向同性缩放晶胞（原子随晶胞移动）
    pub fn scale_cell(&mut self, factor: f64) {
        let matrix = linalg::scale(&self.lattice.matrix, factor);
        self.set_cell(matrix, true);
    }

    /// 用附加的计算器计算能量、力和应力
    pub fn properties(&self) -> Result<Properties> {
        let calculator = self.calculator.as_ref().ok_or(QeosError::MissingCalculator)?;
        calculator.calculate(self)
    }

    /// 势能 (eV)
    pub fn potential_energy(&self) -> Result<f64> {
        Ok(self.properties()?.energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rock_salt() -> Crystal {
        let atoms = vec![
            Atom::new("Na", [0.0, 0.0, 0.0]),
            Atom::new("Na", [0.5, 0.5, 0.0]),
            Atom::new("Na", [0.5, 0.0, 0.5]),
            Atom::new("Na", [0.0, 0.5, 0.5]),
            Atom::new("Cl", [0.5, 0.0, 0.0]),
            Atom::new("Cl", [0.0, 0.5, 0.0]),
            Atom::new("Cl", [0.0, 0.0, 0.5]),
            Atom::new("Cl", [0.5, 0.5, 0.5]),
        ];
        Crystal::new("NaCl", Lattice::cubic(5.64), atoms)
    }

    #[test]
    fn test_lattice_from_parameters_cubic() {
        let lattice = Lattice::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0);
        let (a, b, c, alpha, beta, gamma) = lattice.parameters();

        assert!((a - 5.0).abs() < 1e-6);
        assert!((b - 5.0).abs() < 1e-6);
        assert!((c - 5.0).abs() < 1e-6);
        assert!((alpha - 90.0).abs() < 1e-6);
        assert!((beta - 90.0).abs() < 1e-6);
        assert!((gamma - 90.0).abs() < 1e-6);
        assert!((lattice.volume() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_hexagonal() {
        let lattice = Lattice::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0);
        let (_, _, c, _, _, gamma) = lattice.parameters();

        assert!((c - 5.0).abs() < 0.01);
        assert!((gamma - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_plane_spacings_orthorhombic() {
        let lattice = Lattice::from_vectors([[3.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 5.0]]);
        let d = lattice.plane_spacings();
        assert!((d[0] - 3.0).abs() < 1e-12);
        assert!((d[1] - 4.0).abs() < 1e-12);
        assert!((d[2] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_crystal_formula() {
        let formula = rock_salt().formula();
        assert_eq!(formula, "Cl4Na4");
    }

    #[test]
    fn test_scale_cell_keeps_fractional_positions() {
        let mut crystal = rock_salt();
        let v0 = crystal.volume();
        crystal.scale_cell(1.1);

        assert!((crystal.volume() - v0 * 1.1_f64.powi(3)).abs() < 1e-8);
        assert_eq!(crystal.atoms[7].position, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_set_cell_keeps_cartesian_positions() {
        let mut crystal = rock_salt();
        let before = crystal.cartesian_positions();
        crystal.set_cell(Lattice::cubic(6.0).matrix, false);
        let after = crystal.cartesian_positions();

        for (p, q) in before.iter().zip(after.iter()) {
            for k in 0..3 {
                assert!((p[k] - q[k]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_properties_without_calculator() {
        let crystal = rock_salt();
        assert!(matches!(
            crystal.properties(),
            Err(QeosError::MissingCalculator)
        ));
    }
}
