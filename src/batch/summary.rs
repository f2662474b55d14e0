//! # 批量结果汇总
//!
//! 批量 EoS 计算结束后写出 `eos_summary.csv`，每个结构一行。
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 调用
//! - 使用 `csv` 库写入 CSV 文件

use crate::eos::EosResults;
use crate::error::{QeosError, Result};
use crate::models::Crystal;

use serde::Serialize;
use std::path::Path;

/// 汇总表中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EosSummary {
    pub file: String,
    pub formula: String,
    pub n_atoms: usize,
    pub eos_type: String,
    pub bulk_modulus_gpa: f64,
    pub e_0_ev: f64,
    pub v_0_a3: f64,
    pub emissions_kg: Option<f64>,
}

impl EosSummary {
    pub fn new(file: &Path, crystal: &Crystal, results: &EosResults) -> Self {
        EosSummary {
            file: file.display().to_string(),
            formula: crystal.formula(),
            n_atoms: crystal.atoms.len(),
            eos_type: results.eos.eos_type().to_string(),
            bulk_modulus_gpa: results.bulk_modulus,
            e_0_ev: results.e_0,
            v_0_a3: results.v_0,
            emissions_kg: crystal.info.get("emissions").copied(),
        }
    }
}

/// 写出汇总 CSV
pub fn write_summary(rows: &[EosSummary], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .map_err(|e| QeosError::write_error(output_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_summary() {
        let rows = vec![EosSummary {
            file: "NaCl.cif".to_string(),
            formula: "Cl4Na4".to_string(),
            n_atoms: 8,
            eos_type: "birchmurnaghan".to_string(),
            bulk_modulus_gpa: 24.5,
            e_0_ev: -27.1,
            v_0_a3: 179.4,
            emissions_kg: None,
        }];

        let dir = std::env::temp_dir().join("qeos-summary-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("eos_summary.csv");
        write_summary(&rows, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("file,formula,n_atoms,eos_type,bulk_modulus_gpa,e_0_ev,v_0_a3,emissions_kg")
        );
        assert_eq!(lines.next(), Some("NaCl.cif,Cl4Na4,8,birchmurnaghan,24.5,-27.1,179.4,"));
    }
}
