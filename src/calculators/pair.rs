//! # 对势计算器
//!
//! 周期性体系下的对势能量、解析力与维里应力。
//!
//! ## 模型文件格式 (TOML)
//! ```text
//! cutoff = 8.0
//! default = { kind = "lennard_jones", epsilon = 0.0104, sigma = 3.40 }
//!
//! [[pair]]
//! species = ["Na", "Cl"]
//! potential = { kind = "buckingham", a = 1200.0, rho = 0.32, c = 0.0 }
//! ```
//!
//! ## 算法
//! 1. 由晶面间距确定每个周期方向需要的镜像数
//! 2. 遍历 i <= j 的原子对及其镜像，截断半径内累加
//! 3. 能量在截断处平移为零
//!
//! ## 依赖关系
//! - 被 `calculators/mod.rs` 构造
//! - 使用 `models/` 和 `toml`

use crate::calculators::Calculator;
use crate::error::{QeosError, Result};
use crate::models::linalg::{self, Mat3};
use crate::models::{Crystal, Properties};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 对势函数形式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairPotential {
    /// 4ε[(σ/r)¹² − (σ/r)⁶]
    LennardJones { epsilon: f64, sigma: f64 },
    /// D[e^{−2α(r−r₀)} − 2e^{−α(r−r₀)}]
    Morse { d: f64, alpha: f64, r0: f64 },
    /// A e^{−r/ρ} − C/r⁶
    Buckingham { a: f64, rho: f64, c: f64 },
}

impl PairPotential {
    /// Ar 的 Lennard-Jones 参数
    pub const ARGON: PairPotential = PairPotential::LennardJones {
        epsilon: 0.0104,
        sigma: 3.40,
    };

    /// Cu 的 Morse 参数 (Girifalco & Weizer)
    pub const COPPER: PairPotential = PairPotential::Morse {
        d: 0.3429,
        alpha: 1.3588,
        r0: 2.866,
    };

    /// 返回 (φ(r), dφ/dr)
    pub fn evaluate(&self, r: f64) -> (f64, f64) {
        match *self {
            PairPotential::LennardJones { epsilon, sigma } => {
                let s6 = (sigma / r).powi(6);
                let s12 = s6 * s6;
                (
                    4.0 * epsilon * (s12 - s6),
                    4.0 * epsilon * (6.0 * s6 - 12.0 * s12) / r,
                )
            }
            PairPotential::Morse { d, alpha, r0 } => {
                let x = (-alpha * (r - r0)).exp();
                (d * (x * x - 2.0 * x), 2.0 * alpha * d * (x - x * x))
            }
            PairPotential::Buckingham { a, rho, c } => {
                let rep = a * (-r / rho).exp();
                let r6 = r.powi(6);
                (rep - c / r6, -rep / rho + 6.0 * c / (r6 * r))
            }
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let ok = match *self {
            PairPotential::LennardJones { sigma, .. } => sigma > 0.0,
            PairPotential::Morse { alpha, .. } => alpha > 0.0,
            PairPotential::Buckingham { rho, .. } => rho > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("invalid length scale in {:?}", self))
        }
    }
}

/// 模型文件的原始结构
#[derive(Debug, Deserialize)]
struct RawModel {
    cutoff: f64,
    #[serde(default)]
    default: Option<PairPotential>,
    #[serde(default)]
    pair: Vec<RawPair>,
}

#[derive(Debug, Deserialize)]
struct RawPair {
    species: [String; 2],
    potential: PairPotential,
}

/// 对势参数集：截断半径 + 元素对 → 势函数
#[derive(Debug, Clone)]
pub struct PairModel {
    pub cutoff: f64,
    default: Option<PairPotential>,
    pairs: HashMap<(String, String), PairPotential>,
}

impl PairModel {
    /// 所有元素对使用同一个势函数
    pub fn uniform(potential: PairPotential, cutoff: f64) -> Self {
        PairModel {
            cutoff,
            default: Some(potential),
            pairs: HashMap::new(),
        }
    }

    /// 为一个元素对设置势函数
    pub fn with_pair(mut self, a: &str, b: &str, potential: PairPotential) -> Self {
        self.pairs.insert(pair_key(a, b), potential);
        self
    }

    /// 从 TOML 模型文件读取
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| QeosError::read_error(path, e))?;
        Self::from_toml_str(&content).map_err(|reason| QeosError::ModelFormat {
            path: path.display().to_string(),
            reason,
        })
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, String> {
        let raw: RawModel = toml::from_str(content).map_err(|e| e.to_string())?;

        if !(raw.cutoff > 0.0) {
            return Err(format!("cutoff must be positive, got {}", raw.cutoff));
        }
        if raw.default.is_none() && raw.pair.is_empty() {
            return Err("model defines no potentials".to_string());
        }

        if let Some(default) = &raw.default {
            default.validate()?;
        }

        let mut model = PairModel {
            cutoff: raw.cutoff,
            default: raw.default,
            pairs: HashMap::new(),
        };
        for entry in raw.pair {
            entry.potential.validate()?;
            let [a, b] = &entry.species;
            model = model.with_pair(a, b, entry.potential);
        }
        Ok(model)
    }

    /// 查找元素对的势函数
    pub fn potential(&self, a: &str, b: &str) -> Option<&PairPotential> {
        self.pairs.get(&pair_key(a, b)).or(self.default.as_ref())
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// 对势计算器
#[derive(Debug, Clone)]
pub struct PairCalculator {
    name: String,
    model: PairModel,
}

impl PairCalculator {
    pub fn new(name: impl Into<String>, model: PairModel) -> Self {
        PairCalculator {
            name: name.into(),
            model,
        }
    }

    /// 每个方向需要的镜像数
    fn image_ranges(&self, crystal: &Crystal) -> [i32; 3] {
        let spacings = crystal.lattice.plane_spacings();
        let mut ranges = [0; 3];
        for k in 0..3 {
            if crystal.pbc[k] {
                ranges[k] = (self.model.cutoff / spacings[k]).ceil() as i32;
            }
        }
        ranges
    }
}

impl Calculator for PairCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(&self, crystal: &Crystal) -> Result<Properties> {
        let volume = crystal.volume();
        if volume <= 0.0 || !volume.is_finite() {
            return Err(QeosError::CalculationFailed(format!(
                "degenerate cell for '{}'",
                crystal.name
            )));
        }

        let cutoff = self.model.cutoff;
        let cart = crystal.cartesian_positions();
        let m = crystal.lattice.matrix;
        let [ra, rb, rc] = self.image_ranges(crystal);

        let mut energy = 0.0;
        let mut forces = vec![[0.0; 3]; cart.len()];
        let mut virial: Mat3 = [[0.0; 3]; 3];

        for i in 0..cart.len() {
            for j in i..cart.len() {
                let (ei, ej) = (&crystal.atoms[i].element, &crystal.atoms[j].element);
                let potential = self.model.potential(ei, ej).ok_or_else(|| {
                    QeosError::CalculationFailed(format!("no pair potential for {}-{}", ei, ej))
                })?;
                let shift = potential.evaluate(cutoff).0;
                // 原子与自身镜像的作用在 ±n 处各计一次
                let weight = if i == j { 0.5 } else { 1.0 };

                for na in -ra..=ra {
                    for nb in -rb..=rb {
                        for nc in -rc..=rc {
                            if i == j && na == 0 && nb == 0 && nc == 0 {
                                continue;
                            }
                            let t = linalg::vec_mat(&[na as f64, nb as f64, nc as f64], &m);
                            let d = [
                                cart[j][0] + t[0] - cart[i][0],
                                cart[j][1] + t[1] - cart[i][1],
                                cart[j][2] + t[2] - cart[i][2],
                            ];
                            let r = linalg::norm(&d);
                            if r >= cutoff {
                                continue;
                            }
                            if r < 1e-8 {
                                return Err(QeosError::CalculationFailed(format!(
                                    "atoms {} and {} overlap",
                                    i, j
                                )));
                            }

                            let (phi, dphi) = potential.evaluate(r);
                            energy += weight * (phi - shift);

                            let g = dphi / r;
                            if i != j {
                                for k in 0..3 {
                                    forces[i][k] += g * d[k];
                                    forces[j][k] -= g * d[k];
                                }
                            }
                            for a in 0..3 {
                                for b in 0..3 {
                                    virial[a][b] += weight * g * d[a] * d[b];
                                }
                            }
                        }
                    }
                }
            }
        }

        let stress = linalg::matrix_to_voigt(&linalg::scale(&virial, 1.0 / volume));

        Ok(Properties {
            energy,
            forces,
            stress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};
    use approx::assert_relative_eq;

    fn distorted_fcc() -> Crystal {
        let atoms = vec![
            Atom::new("Ar", [0.01, 0.0, 0.02]),
            Atom::new("Ar", [0.5, 0.52, 0.0]),
            Atom::new("Ar", [0.49, 0.0, 0.5]),
            Atom::new("Ar", [0.0, 0.5, 0.47]),
        ];
        let lattice = Lattice::from_vectors([[5.3, 0.1, 0.0], [0.0, 5.25, 0.0], [0.05, 0.0, 5.4]]);
        Crystal::new("Ar", lattice, atoms)
    }

    fn argon_calculator() -> PairCalculator {
        PairCalculator::new("lj", PairModel::uniform(PairPotential::ARGON, 8.5))
    }

    #[test]
    fn test_dimer_energy_at_minimum() {
        let sigma = 3.40;
        let r_min = 2.0_f64.powf(1.0 / 6.0) * sigma;
        let atoms = vec![Atom::new("Ar", [0.0, 0.0, 0.0]), Atom::new("Ar", [r_min / 30.0, 0.0, 0.0])];
        let mut dimer = Crystal::new("Ar2", Lattice::cubic(30.0), atoms);
        dimer.pbc = [false; 3];

        let calc = argon_calculator();
        let props = calc.calculate(&dimer).unwrap();
        let shift = PairPotential::ARGON.evaluate(8.5).0;

        assert_relative_eq!(props.energy, -0.0104 - shift, epsilon = 1e-10);
        assert!(props.max_force() < 1e-10);
    }

    #[test]
    fn test_forces_match_finite_differences() {
        let crystal = distorted_fcc();
        let calc = argon_calculator();
        let props = calc.calculate(&crystal).unwrap();
        let h = 1e-5;

        for atom in 0..crystal.atoms.len() {
            for k in 0..3 {
                let mut plus = crystal.clone();
                let mut minus = crystal.clone();
                let mut pos = crystal.cartesian_positions();
                pos[atom][k] += h;
                plus.set_cartesian_positions(&pos);
                pos[atom][k] -= 2.0 * h;
                minus.set_cartesian_positions(&pos);

                let e_plus = calc.calculate(&plus).unwrap().energy;
                let e_minus = calc.calculate(&minus).unwrap().energy;
                let numeric = -(e_plus - e_minus) / (2.0 * h);
                assert_relative_eq!(props.forces[atom][k], numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_stress_matches_strain_derivative() {
        let crystal = distorted_fcc();
        let calc = argon_calculator();
        let props = calc.calculate(&crystal).unwrap();
        let h = 1e-5;

        let strained = |eps: f64| {
            let mut c = crystal.clone();
            let mut deformation = linalg::IDENTITY;
            deformation[0][0] += eps;
            c.set_cell(linalg::mat_mul(&crystal.lattice.matrix, &deformation), true);
            calc.calculate(&c).unwrap().energy
        };

        let numeric = (strained(h) - strained(-h)) / (2.0 * h) / crystal.volume();
        assert_relative_eq!(props.stress[0], numeric, epsilon = 1e-7);
    }

    #[test]
    fn test_translation_invariance() {
        let crystal = distorted_fcc();
        let calc = argon_calculator();
        let e0 = calc.calculate(&crystal).unwrap().energy;

        let mut shifted = crystal.clone();
        for atom in shifted.atoms.iter_mut() {
            atom.position[1] += 0.137;
        }
        let e1 = calc.calculate(&shifted).unwrap().energy;
        assert_relative_eq!(e0, e1, epsilon = 1e-10);
    }

    #[test]
    fn test_model_from_toml() {
        let model = PairModel::from_toml_str(
            r#"
cutoff = 7.5
default = { kind = "lennard_jones", epsilon = 0.01, sigma = 3.0 }

[[pair]]
species = ["Cl", "Na"]
potential = { kind = "buckingham", a = 1200.0, rho = 0.32, c = 0.0 }
"#,
        )
        .unwrap();

        assert_eq!(model.cutoff, 7.5);
        assert!(matches!(
            model.potential("Na", "Cl"),
            Some(PairPotential::Buckingham { .. })
        ));
        assert!(matches!(
            model.potential("Na", "Na"),
            Some(PairPotential::LennardJones { .. })
        ));
    }

    #[test]
    fn test_invalid_model_rejected() {
        assert!(PairModel::from_toml_str("cutoff = -1.0\ndefault = { kind = \"morse\", d = 1.0, alpha = 1.0, r0 = 2.0 }").is_err());
        assert!(PairModel::from_toml_str("cutoff = 5.0").is_err());
        assert!(PairModel::from_toml_str("not toml at all [").is_err());
    }

    #[test]
    fn test_missing_pair_is_error() {
        let model = PairModel {
            cutoff: 6.0,
            default: None,
            pairs: HashMap::new(),
        }
        .with_pair("Na", "Na", PairPotential::ARGON);
        let calc = PairCalculator::new("pair", model);

        let crystal = Crystal::new(
            "NaCl",
            Lattice::cubic(5.0),
            vec![Atom::new("Na", [0.0; 3]), Atom::new("Cl", [0.5; 3])],
        );
        assert!(calc.calculate(&crystal).is_err());
    }
}
