//! # 几何优化模块
//!
//! 用附加的计算器弛豫结构，可选同时优化晶胞。
//!
//! ## 日志
//! 每次运行输出 `Using filter: ...`、`Using optimizer: ...` 和
//! `Starting geometry optimization`，结束时记录收敛或未收敛。
//!
//! ## 依赖关系
//! - 被 `eos/` 使用
//! - 子模块: filter, optimizers
//! - 使用 `tracing` 记录过程

pub mod filter;
pub mod optimizers;

pub use filter::{CellFilter, FilterKind};
pub use optimizers::{Optimizer, OptimizerKind};

use crate::error::{QeosError, Result};
use crate::models::Crystal;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 几何优化参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeomOptConfig {
    /// 收敛判据：最大广义力 (eV/Å)
    pub fmax: f64,
    /// 最大步数
    pub steps: usize,
    /// 晶胞自由度
    pub filter: FilterKind,
    /// 优化算法
    pub optimizer: OptimizerKind,
}

impl Default for GeomOptConfig {
    fn default() -> Self {
        GeomOptConfig {
            fmax: 0.1,
            steps: 1000,
            filter: FilterKind::Hydrostatic,
            optimizer: OptimizerKind::Fire,
        }
    }
}

impl GeomOptConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fmax > 0.0) {
            return Err(QeosError::InvalidConfig(format!(
                "fmax must be positive, got {}",
                self.fmax
            )));
        }
        Ok(())
    }
}

/// 优化结果摘要
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSummary {
    pub converged: bool,
    pub steps: usize,
    pub energy: f64,
    pub fmax: f64,
}

/// 几何优化：在原结构上就地修改
pub struct GeomOpt<'a> {
    crystal: &'a mut Crystal,
    config: GeomOptConfig,
}

impl<'a> GeomOpt<'a> {
    pub fn new(crystal: &'a mut Crystal, config: GeomOptConfig) -> Result<Self> {
        config.validate()?;

        if !crystal.has_calculator() {
            return Err(QeosError::MissingCalculator);
        }
        if config.filter != FilterKind::None && !crystal.pbc.iter().all(|&p| p) {
            return Err(QeosError::InvalidConfig(format!(
                "Filter '{}' requires a fully periodic structure",
                config.filter
            )));
        }

        Ok(GeomOpt { crystal, config })
    }

    /// 运行优化直到收敛或达到最大步数
    pub fn run(&mut self) -> Result<OptimizationSummary> {
        info!("Using filter: {}", self.config.filter);
        info!("Using optimizer: {}", self.config.optimizer);
        info!("Starting geometry optimization");

        let filter = CellFilter::new(self.config.filter, self.crystal);
        let mut optimizer = self.config.optimizer.build();
        let mut x = filter.positions(self.crystal);

        let mut step = 0;
        loop {
            let props = self.crystal.properties()?;
            let forces = filter.forces(self.crystal, &props);
            let fmax = filter.max_force(&forces);
            debug!(step, energy = props.energy, fmax, "Optimization step");

            if fmax <= self.config.fmax {
                info!(
                    "Geometry optimization converged after {} steps (fmax = {:.4} eV/A)",
                    step, fmax
                );
                return Ok(OptimizationSummary {
                    converged: true,
                    steps: step,
                    energy: props.energy,
                    fmax,
                });
            }

            if step >= self.config.steps {
                warn!(
                    "Geometry optimization did not converge after {} steps (fmax = {:.4} eV/A)",
                    step, fmax
                );
                return Ok(OptimizationSummary {
                    converged: false,
                    steps: step,
                    energy: props.energy,
                    fmax,
                });
            }

            optimizer.step(&mut x, &forces, props.energy);
            filter.set_positions(self.crystal, &x);
            step += 1;
        }
    }
}
