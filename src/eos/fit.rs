//! # 状态方程拟合
//!
//! 把 E(V) 样本拟合为参数化的状态方程，得到平衡体积 V₀、
//! 最低能量 E₀ 和体弹模量 B₀。
//!
//! ## 支持的模型
//! | 名称 | 参数 |
//! |------|------|
//! | `sj` | E = c₀ + c₁t + c₂t² + c₃t³, t = V^(−1/3) |
//! | `taylor` | E₀, β, α, V₀ |
//! | `murnaghan` | E₀, B₀, B', V₀ |
//! | `birch` | E₀, B₀, B', V₀ |
//! | `birchmurnaghan` | E₀, B₀, B', V₀ |
//! | `pouriertarantola` | E₀, B₀, B', V₀ |
//! | `vinet` | E₀, B₀, B', V₀ |
//! | `antonschmidt` | E∞, B, n, V₀ |
//! | `p3` | E = c₀ + c₁V + c₂V² + c₃V³ |
//!
//! 非线性模型以抛物线拟合给出初值（B' = 4），再用 Levenberg-Marquardt 精修。
//!
//! ## 依赖关系
//! - 被 `eos/mod.rs` 和 `eos/plot.rs` 使用

use crate::error::{QeosError, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// eV/Å³ → GPa
pub const EV_PER_A3_TO_GPA: f64 = 160.217_662_08;

/// 状态方程模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EosType {
    Sj,
    Taylor,
    Murnaghan,
    Birch,
    #[default]
    BirchMurnaghan,
    PourierTarantola,
    Vinet,
    AntonSchmidt,
    P3,
}

impl EosType {
    pub const ALL: [EosType; 9] = [
        EosType::Sj,
        EosType::Taylor,
        EosType::Murnaghan,
        EosType::Birch,
        EosType::BirchMurnaghan,
        EosType::PourierTarantola,
        EosType::Vinet,
        EosType::AntonSchmidt,
        EosType::P3,
    ];

    /// 拟合参数个数
    pub fn n_parameters(self) -> usize {
        4
    }

    /// 模型能量；`p` 为该模型的参数
    fn energy(self, v: f64, p: &[f64; 4]) -> f64 {
        match self {
            EosType::Sj => {
                let t = v.cbrt().recip();
                p[0] + t * (p[1] + t * (p[2] + t * p[3]))
            }
            EosType::P3 => p[0] + v * (p[1] + v * (p[2] + v * p[3])),
            EosType::Taylor => {
                let (e0, beta, alpha, v0) = (p[0], p[1], p[2], p[3]);
                let dv = v - v0;
                e0 + beta / 2.0 * dv * dv / v0 + alpha / 6.0 * dv * dv * dv / v0
            }
            EosType::Murnaghan => {
                let (e0, b0, bp, v0) = (p[0], p[1], p[2], p[3]);
                e0 + b0 * v / bp * ((v0 / v).powf(bp) / (bp - 1.0) + 1.0) - v0 * b0 / (bp - 1.0)
            }
            EosType::Birch => {
                let (e0, b0, bp, v0) = (p[0], p[1], p[2], p[3]);
                let x = (v0 / v).powf(2.0 / 3.0) - 1.0;
                e0 + 9.0 / 8.0 * b0 * v0 * x * x + 9.0 / 16.0 * b0 * v0 * (bp - 4.0) * x * x * x
            }
            EosType::BirchMurnaghan => {
                let (e0, b0, bp, v0) = (p[0], p[1], p[2], p[3]);
                let eta2 = (v0 / v).powf(2.0 / 3.0);
                let x = eta2 - 1.0;
                e0 + 9.0 * b0 * v0 / 16.0 * x * x * (6.0 + bp * x - 4.0 * eta2)
            }
            EosType::PourierTarantola => {
                let (e0, b0, bp, v0) = (p[0], p[1], p[2], p[3]);
                let squiggle = -3.0 * (v / v0).cbrt().ln();
                e0 + b0 * v0 * squiggle * squiggle / 6.0 * (3.0 + squiggle * (bp - 2.0))
            }
            EosType::Vinet => {
                let (e0, b0, bp, v0) = (p[0], p[1], p[2], p[3]);
                let eta = (v / v0).cbrt();
                e0 + 2.0 * b0 * v0 / ((bp - 1.0) * (bp - 1.0))
                    * (2.0
                        - (5.0 + 3.0 * bp * (eta - 1.0) - 3.0 * eta)
                            * (-3.0 * (bp - 1.0) * (eta - 1.0) / 2.0).exp())
            }
            EosType::AntonSchmidt => {
                let (e_inf, b, n, v0) = (p[0], p[1], p[2], p[3]);
                let x = v / v0;
                b * v0 / (n + 1.0) * x.powf(n + 1.0) * (x.ln() - 1.0 / (n + 1.0)) + e_inf
            }
        }
    }
}

impl FromStr for EosType {
    type Err = QeosError;

    fn from_str(s: &str) -> Result<Self> {
        let name: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        EosType::ALL
            .into_iter()
            .find(|t| t.to_string() == name)
            .ok_or_else(|| {
                QeosError::InvalidConfig(format!(
                    "Unknown EoS type '{}'. Available: {}",
                    s,
                    EosType::ALL.map(|t| t.to_string()).join(", ")
                ))
            })
    }
}

impl fmt::Display for EosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EosType::Sj => "sj",
            EosType::Taylor => "taylor",
            EosType::Murnaghan => "murnaghan",
            EosType::Birch => "birch",
            EosType::BirchMurnaghan => "birchmurnaghan",
            EosType::PourierTarantola => "pouriertarantola",
            EosType::Vinet => "vinet",
            EosType::AntonSchmidt => "antonschmidt",
            EosType::P3 => "p3",
        };
        write!(f, "{}", name)
    }
}

/// 拟合后的状态方程
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquationOfState {
    eos_type: EosType,
    volumes: Vec<f64>,
    energies: Vec<f64>,
    parameters: [f64; 4],
    v0: f64,
    e0: f64,
    b0: f64,
}

impl EquationOfState {
    /// 拟合 E(V) 样本
    pub fn fit(volumes: &[f64], energies: &[f64], eos_type: EosType) -> Result<Self> {
        if volumes.len() != energies.len() {
            return Err(QeosError::FitFailed(format!(
                "{} volumes but {} energies",
                volumes.len(),
                energies.len()
            )));
        }
        if volumes.len() < eos_type.n_parameters() {
            return Err(QeosError::FitFailed(format!(
                "{} model needs at least {} samples, got {}",
                eos_type,
                eos_type.n_parameters(),
                volumes.len()
            )));
        }
        if volumes.iter().chain(energies).any(|x| !x.is_finite()) {
            return Err(QeosError::FitFailed("non-finite sample".to_string()));
        }

        let (parameters, v0, e0, b0) = match eos_type {
            EosType::Sj => fit_sj(volumes, energies)?,
            EosType::P3 => fit_p3(volumes, energies)?,
            _ => fit_nonlinear(volumes, energies, eos_type)?,
        };

        if ![v0, e0, b0].iter().all(|x| x.is_finite()) || v0 <= 0.0 {
            return Err(QeosError::FitFailed(format!(
                "{} fit gave unphysical parameters (V0 = {}, E0 = {}, B0 = {})",
                eos_type, v0, e0, b0
            )));
        }

        Ok(EquationOfState {
            eos_type,
            volumes: volumes.to_vec(),
            energies: energies.to_vec(),
            parameters,
            v0,
            e0,
            b0,
        })
    }

    pub fn eos_type(&self) -> EosType {
        self.eos_type
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    pub fn parameters(&self) -> &[f64; 4] {
        &self.parameters
    }

    /// 平衡体积 (Å³)
    pub fn v0(&self) -> f64 {
        self.v0
    }

    /// 最低能量 (eV)
    pub fn e0(&self) -> f64 {
        self.e0
    }

    /// 体弹模量 (eV/Å³)
    pub fn b0(&self) -> f64 {
        self.b0
    }

    /// 体弹模量 (GPa)
    pub fn bulk_modulus_gpa(&self) -> f64 {
        self.b0 * EV_PER_A3_TO_GPA
    }

    /// 拟合曲线在体积 `v` 处的能量
    pub fn energy(&self, v: f64) -> f64 {
        self.eos_type.energy(v, &self.parameters)
    }

    /// 在样本体积范围内均匀取 `n` 个点
    pub fn curve(&self, n: usize) -> Vec<(f64, f64)> {
        let lo = self.volumes.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        linspace(lo, hi, n)
            .into_iter()
            .map(|v| (v, self.energy(v)))
            .collect()
    }
}

/// 闭区间等分
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 多项式模型
// ─────────────────────────────────────────────────────────────

type FitOutput = ([f64; 4], f64, f64, f64);

/// 最小二乘多项式拟合，返回 x 的幂次系数
///
/// 先在居中缩放的变量 u = (x − m)/w ∈ [−1, 1] 上求解正规方程，再展开回 x。
fn polyfit<const N: usize>(x: &[f64], y: &[f64]) -> Result<[f64; N]> {
    let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (m, w) = ((lo + hi) / 2.0, (hi - lo) / 2.0);
    if !(w > 0.0) {
        return Err(QeosError::FitFailed("degenerate sample points".to_string()));
    }

    let mut ata = [[0.0; N]; N];
    let mut aty = [0.0; N];
    for (&xi, &yi) in x.iter().zip(y) {
        let u = (xi - m) / w;
        let mut powers = [1.0; N];
        for k in 1..N {
            powers[k] = powers[k - 1] * u;
        }
        for i in 0..N {
            aty[i] += powers[i] * yi;
            for j in 0..N {
                ata[i][j] += powers[i] * powers[j];
            }
        }
    }

    let d = solve(ata, aty)
        .ok_or_else(|| QeosError::FitFailed("singular polynomial fit".to_string()))?;

    // Σ d_k ((x − m)/w)^k，(x − m)^k = Σ_j C(k, j) x^j (−m)^(k−j)
    let mut coeffs = [0.0; N];
    for (k, dk) in d.iter().enumerate() {
        let scaled = dk / w.powi(k as i32);
        let mut binom = 1.0;
        for j in 0..=k {
            coeffs[j] += scaled * binom * (-m).powi((k - j) as i32);
            binom *= (k - j) as f64 / (j + 1) as f64;
        }
    }
    Ok(coeffs)
}

fn fit_p3(volumes: &[f64], energies: &[f64]) -> Result<FitOutput> {
    let c = polyfit::<4>(volumes, energies)?;

    // dE/dV = c₁ + 2c₂V + 3c₃V² = 0 的 (−b + √D)/(2a) 根，写成 c₃ → 0 时稳定的形式
    let (a, b, q) = (3.0 * c[3], 2.0 * c[2], c[1]);
    let v0 = -2.0 * q / (b + (b * b - 4.0 * a * q).sqrt());
    let e0 = EosType::P3.energy(v0, &c);
    let b0 = (2.0 * c[2] + 6.0 * c[3] * v0) * v0;
    Ok((c, v0, e0, b0))
}

fn fit_sj(volumes: &[f64], energies: &[f64]) -> Result<FitOutput> {
    let t: Vec<f64> = volumes.iter().map(|v| v.cbrt().recip()).collect();
    let c = polyfit::<4>(&t, energies)?;

    // dE/dt = c₁ + 2c₂t + 3c₃t² 的正根中取 d²E/dt² > 0 者
    let (a, b, q) = (3.0 * c[3], 2.0 * c[2], c[1]);
    let disc = b * b - 4.0 * a * q;
    let mut roots = Vec::new();
    if disc >= 0.0 {
        roots.push(-2.0 * q / (b + disc.sqrt()));
        if a != 0.0 {
            roots.push((-b - disc.sqrt()) / (2.0 * a));
        }
    }
    let second = |t: f64| 2.0 * c[2] + 6.0 * c[3] * t;
    let t0 = roots
        .into_iter()
        .find(|&t| t > 0.0 && second(t) > 0.0)
        .ok_or_else(|| QeosError::FitFailed("sj fit has no minimum".to_string()))?;

    let v0 = t0.powi(-3);
    let e0 = EosType::Sj.energy(v0, &c);
    let b0 = t0.powi(5) * second(t0) / 9.0;
    Ok((c, v0, e0, b0))
}

// ─────────────────────────────────────────────────────────────
// 非线性模型
// ─────────────────────────────────────────────────────────────

/// 抛物线初值: (E₀, B₀, V₀)
fn parabola_guess(volumes: &[f64], energies: &[f64]) -> Result<(f64, f64, f64)> {
    let [a, b, c] = polyfit::<3>(volumes, energies)?;
    if !(c > 0.0) {
        return Err(QeosError::FitFailed(
            "energies are not convex in volume; cannot estimate a minimum".to_string(),
        ));
    }
    let v_min = -b / (2.0 * c);
    let e_min = a + b * v_min + c * v_min * v_min;
    Ok((e_min, 2.0 * c * v_min, v_min))
}

fn fit_nonlinear(volumes: &[f64], energies: &[f64], eos_type: EosType) -> Result<FitOutput> {
    let (e0, b0, v0) = parabola_guess(volumes, energies)?;
    let initial = match eos_type {
        // B' = −2n，E(V₀) = E∞ − B V₀/(n+1)²
        EosType::AntonSchmidt => [e0 + b0 * v0, b0, -2.0, v0],
        _ => [e0, b0, 4.0, v0],
    };

    let p = levenberg_marquardt(volumes, energies, eos_type, initial)?;
    let v0 = p[3];
    let (e0, b0) = match eos_type {
        EosType::AntonSchmidt => (eos_type.energy(v0, &p), p[1]),
        _ => (p[0], p[1]),
    };
    Ok((p, v0, e0, b0))
}

fn sum_squares(volumes: &[f64], energies: &[f64], eos_type: EosType, p: &[f64; 4]) -> f64 {
    if !(p[3] > 0.0) {
        return f64::INFINITY;
    }
    let cost: f64 = volumes
        .iter()
        .zip(energies)
        .map(|(&v, &e)| {
            let r = eos_type.energy(v, p) - e;
            r * r
        })
        .sum();
    if cost.is_finite() {
        cost
    } else {
        f64::INFINITY
    }
}

fn levenberg_marquardt(
    volumes: &[f64],
    energies: &[f64],
    eos_type: EosType,
    mut p: [f64; 4],
) -> Result<[f64; 4]> {
    let mut cost = sum_squares(volumes, energies, eos_type, &p);
    if !cost.is_finite() {
        return Err(QeosError::FitFailed(format!(
            "{} model is undefined at the initial guess",
            eos_type
        )));
    }

    let mut lambda = 1e-3;
    for _ in 0..500 {
        // 数值雅可比（中心差分）
        let residuals: Vec<f64> = volumes
            .iter()
            .zip(energies)
            .map(|(&v, &e)| eos_type.energy(v, &p) - e)
            .collect();
        let mut jacobian = vec![[0.0; 4]; volumes.len()];
        for k in 0..4 {
            let h = 1e-6 * p[k].abs().max(1e-3);
            let (mut plus, mut minus) = (p, p);
            plus[k] += h;
            minus[k] -= h;
            for (row, &v) in jacobian.iter_mut().zip(volumes) {
                row[k] = (eos_type.energy(v, &plus) - eos_type.energy(v, &minus)) / (2.0 * h);
            }
        }

        let mut jtj = [[0.0; 4]; 4];
        let mut jtr = [0.0; 4];
        for (row, r) in jacobian.iter().zip(&residuals) {
            for i in 0..4 {
                jtr[i] += row[i] * r;
                for j in 0..4 {
                    jtj[i][j] += row[i] * row[j];
                }
            }
        }

        let mut improved = false;
        while lambda < 1e16 {
            let mut damped = jtj;
            for (i, row) in damped.iter_mut().enumerate() {
                row[i] += lambda * jtj[i][i].max(1e-30);
            }
            let Some(delta) = solve(damped, jtr.map(|g| -g)) else {
                lambda *= 10.0;
                continue;
            };

            let mut trial = p;
            for k in 0..4 {
                trial[k] += delta[k];
            }
            let trial_cost = sum_squares(volumes, energies, eos_type, &trial);

            if trial_cost < cost {
                let small_step = (0..4).all(|k| delta[k].abs() <= 1e-12 * p[k].abs().max(1e-12));
                let small_gain = cost - trial_cost <= 1e-15 * cost.max(f64::MIN_POSITIVE);
                p = trial;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-15);
                improved = !(small_step || small_gain);
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            break;
        }
    }

    if p.iter().all(|x| x.is_finite()) {
        Ok(p)
    } else {
        Err(QeosError::FitFailed(format!("{} fit diverged", eos_type)))
    }
}

/// 高斯消元（部分主元）求解 A x = b
fn solve<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Option<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
