//! # 优化算法
//!
//! 在广义坐标上工作的局部优化器：
//! - FIRE (Fast Inertial Relaxation Engine)
//! - 带回溯的最速下降
//!
//! ## 依赖关系
//! - 被 `optimize/mod.rs` 使用

use crate::error::{QeosError, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 单步最大位移 (Å)
const MAX_STEP: f64 = 0.2;

/// 优化器接口
pub trait Optimizer {
    /// 根据当前能量与广义力就地更新坐标
    fn step(&mut self, x: &mut [f64], forces: &[f64], energy: f64);
}

/// 优化器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Fire,
    SteepestDescent,
}

impl OptimizerKind {
    pub fn build(self) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Fire => Box::new(Fire::default()),
            OptimizerKind::SteepestDescent => Box::new(SteepestDescent::default()),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = QeosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fire" => Ok(OptimizerKind::Fire),
            "sd" | "steepest_descent" => Ok(OptimizerKind::SteepestDescent),
            other => Err(QeosError::InvalidConfig(format!(
                "Unknown optimizer '{}'. Available: fire, steepest_descent",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Fire => write!(f, "FIRE"),
            OptimizerKind::SteepestDescent => write!(f, "SteepestDescent"),
        }
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// 把位移整体缩放到不超过 `MAX_STEP`
fn limit_step(dr: &mut [f64]) {
    let length = norm(dr);
    if length > MAX_STEP {
        let factor = MAX_STEP / length;
        dr.iter_mut().for_each(|d| *d *= factor);
    }
}

// ─────────────────────────────────────────────────────────────
// FIRE
// ─────────────────────────────────────────────────────────────

/// FIRE 优化器（单位质量）
#[derive(Debug, Clone)]
pub struct Fire {
    dt: f64,
    dt_max: f64,
    n_min: usize,
    f_inc: f64,
    f_dec: f64,
    a_start: f64,
    f_a: f64,
    a: f64,
    n_positive: usize,
    velocity: Option<Vec<f64>>,
}

impl Default for Fire {
    fn default() -> Self {
        Fire {
            dt: 0.1,
            dt_max: 1.0,
            n_min: 5,
            f_inc: 1.1,
            f_dec: 0.5,
            a_start: 0.1,
            f_a: 0.99,
            a: 0.1,
            n_positive: 0,
            velocity: None,
        }
    }
}

impl Optimizer for Fire {
    fn step(&mut self, x: &mut [f64], forces: &[f64], _energy: f64) {
        let mut v = match self.velocity.take() {
            None => vec![0.0; x.len()],
            Some(mut v) => {
                let vf: f64 = v.iter().zip(forces).map(|(a, b)| a * b).sum();
                if vf > 0.0 {
                    let v_norm = norm(&v);
                    let f_norm = norm(forces).max(f64::MIN_POSITIVE);
                    for (vi, fi) in v.iter_mut().zip(forces) {
                        *vi = (1.0 - self.a) * *vi + self.a * fi / f_norm * v_norm;
                    }
                    if self.n_positive > self.n_min {
                        self.dt = (self.dt * self.f_inc).min(self.dt_max);
                        self.a *= self.f_a;
                    }
                    self.n_positive += 1;
                } else {
                    v.iter_mut().for_each(|vi| *vi = 0.0);
                    self.a = self.a_start;
                    self.dt *= self.f_dec;
                    self.n_positive = 0;
                }
                v
            }
        };

        for (vi, fi) in v.iter_mut().zip(forces) {
            *vi += self.dt * fi;
        }

        let mut dr: Vec<f64> = v.iter().map(|vi| self.dt * vi).collect();
        limit_step(&mut dr);
        for (xi, di) in x.iter_mut().zip(&dr) {
            *xi += di;
        }

        self.velocity = Some(v);
    }
}

// ─────────────────────────────────────────────────────────────
// 最速下降
// ─────────────────────────────────────────────────────────────

/// 最速下降：能量升高时退回上一步并缩小步长
#[derive(Debug, Clone)]
pub struct SteepestDescent {
    alpha: f64,
    accepted: Option<(Vec<f64>, Vec<f64>, f64)>,
}

impl Default for SteepestDescent {
    fn default() -> Self {
        SteepestDescent {
            alpha: 0.05,
            accepted: None,
        }
    }
}

impl Optimizer for SteepestDescent {
    fn step(&mut self, x: &mut [f64], forces: &[f64], energy: f64) {
        let rejected = matches!(&self.accepted, Some((_, _, e)) if energy > *e);

        if rejected {
            self.alpha *= 0.5;
        } else {
            if self.accepted.is_some() {
                self.alpha *= 1.2;
            }
            self.accepted = Some((x.to_vec(), forces.to_vec(), energy));
        }

        let Some((origin, direction, _)) = &self.accepted else {
            return;
        };

        let mut dr: Vec<f64> = direction.iter().map(|f| self.alpha * f).collect();
        limit_step(&mut dr);
        for ((xi, oi), di) in x.iter_mut().zip(origin).zip(&dr) {
            *xi = oi + di;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// E = Σ k_i x_i² / 2
    fn quadratic(x: &[f64]) -> (f64, Vec<f64>) {
        let k = [1.0, 4.0, 9.0];
        let energy = x.iter().zip(k).map(|(xi, ki)| 0.5 * ki * xi * xi).sum();
        let forces = x.iter().zip(k).map(|(xi, ki)| -ki * xi).collect();
        (energy, forces)
    }

    fn minimize(mut optimizer: Box<dyn Optimizer>) -> Vec<f64> {
        let mut x = vec![1.0, -0.5, 0.3];
        for _ in 0..2000 {
            let (energy, forces) = quadratic(&x);
            if norm(&forces) < 1e-6 {
                break;
            }
            optimizer.step(&mut x, &forces, energy);
        }
        x
    }

    #[test]
    fn test_fire_converges_on_quadratic() {
        let x = minimize(OptimizerKind::Fire.build());
        assert!(norm(&x) < 1e-5);
    }

    #[test]
    fn test_steepest_descent_converges_on_quadratic() {
        let x = minimize(OptimizerKind::SteepestDescent.build());
        assert!(norm(&x) < 1e-5);
    }

    #[test]
    fn test_step_is_limited() {
        let mut x = vec![0.0; 3];
        let mut fire = Fire::default();
        fire.step(&mut x, &[1000.0, 0.0, 0.0], 0.0);
        assert!((norm(&x) - MAX_STEP).abs() < 1e-12);
    }

    #[test]
    fn test_optimizer_names() {
        assert_eq!("FIRE".parse::<OptimizerKind>().unwrap(), OptimizerKind::Fire);
        assert_eq!("sd".parse::<OptimizerKind>().unwrap(), OptimizerKind::SteepestDescent);
        assert_eq!(OptimizerKind::Fire.to_string(), "FIRE");
    }
}
