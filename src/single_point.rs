//! # 单点计算
//!
//! 读取结构（或多帧轨迹），附加计算器，计算每一帧的能量、力和应力。
//! 能量同时写入各帧 `info["energy"]`。
//!
//! ## 依赖关系
//! - 被 `commands/single_point.rs` 使用
//! - 使用 `calculators/`、`parsers/`、`eos::StructureSource`

use crate::calculators::CalculatorSpec;
use crate::eos::StructureSource;
use crate::error::{QeosError, Result};
use crate::models::{Crystal, Properties};
use crate::parsers;

use tracing::info;

/// 单点计算
#[derive(Debug)]
pub struct SinglePoint {
    frames: Vec<Crystal>,
}

impl SinglePoint {
    /// 读取结构并附加计算器
    ///
    /// `spec` 为空时要求每一帧已附加计算器。
    pub fn new(source: impl Into<StructureSource>, spec: Option<&CalculatorSpec>) -> Result<Self> {
        let mut frames = match source.into() {
            StructureSource::Path(path) => parsers::read_structures(&path)?,
            StructureSource::Structure(crystal) => vec![crystal],
            StructureSource::Trajectory(frames) => frames,
        };

        if frames.is_empty() {
            return Err(QeosError::InvalidStructure("No structures to evaluate".to_string()));
        }

        match spec {
            Some(spec) => {
                let calculator = spec.build()?;
                for frame in &mut frames {
                    frame.attach_calculator(calculator.clone());
                }
            }
            None if frames.iter().any(|f| !f.has_calculator()) => {
                return Err(QeosError::MissingCalculator);
            }
            None => {}
        }

        Ok(SinglePoint { frames })
    }

    /// 第一帧
    pub fn structure(&self) -> &Crystal {
        &self.frames[0]
    }

    pub fn frames(&self) -> &[Crystal] {
        &self.frames
    }

    pub fn is_trajectory(&self) -> bool {
        self.frames.len() > 1
    }

    /// 计算每一帧
    pub fn run(&mut self) -> Result<Vec<Properties>> {
        let mut results = Vec::with_capacity(self.frames.len());
        for frame in &mut self.frames {
            let props = frame.properties()?;
            info!("{}: energy = {:.6} eV", frame.name, props.energy);
            frame.info.insert("energy".to_string(), props.energy);
            results.push(props);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};
    use std::fs;

    fn argon() -> Crystal {
        let atoms = vec![
            Atom::new("Ar", [0.0, 0.0, 0.0]),
            Atom::new("Ar", [0.5, 0.5, 0.0]),
            Atom::new("Ar", [0.5, 0.0, 0.5]),
            Atom::new("Ar", [0.0, 0.5, 0.5]),
        ];
        Crystal::new("Ar", Lattice::cubic(5.26), atoms)
    }

    #[test]
    fn test_single_structure() {
        let mut sp = SinglePoint::new(argon(), Some(&CalculatorSpec::new("lj"))).unwrap();
        let results = sp.run().unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].energy < 0.0);
        // fcc 对称位置上受力为零
        assert!(results[0].max_force() < 1e-10);
        assert_eq!(sp.structure().info["energy"], results[0].energy);
    }

    #[test]
    fn test_trajectory_file() {
        let dir = std::env::temp_dir().join("qeos-single-point-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dimer-traj.xyz");
        fs::write(&path, "2\nstep=0\nAr 0 0 0\nAr 3.8 0 0\n2\nstep=1\nAr 0 0 0\nAr 4.0 0 0\n").unwrap();

        let mut sp = SinglePoint::new(path, Some(&CalculatorSpec::new("lj"))).unwrap();
        assert!(sp.is_trajectory());
        let results = sp.run().unwrap();
        assert_eq!(results.len(), 2);
        assert!(sp.frames().iter().all(|f| f.info.contains_key("energy")));
    }

    #[test]
    fn test_missing_calculator() {
        let err = SinglePoint::new(argon(), None).unwrap_err();
        assert!(matches!(err, QeosError::MissingCalculator));
    }
}
