//! # singlepoint 子命令实现
//!
//! 计算结构（或轨迹每一帧）的能量、最大受力和压强，以表格打印。
//!
//! ## 依赖关系
//! - 使用 `cli/single_point.rs` 定义的 SinglePointArgs
//! - 使用 `single_point.rs` 执行计算

use crate::calculators::CalculatorSpec;
use crate::cli::single_point::SinglePointArgs;
use crate::error::{QeosError, Result};
use crate::eos::EV_PER_A3_TO_GPA;
use crate::models::{Crystal, Properties};
use crate::single_point::SinglePoint;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 单点结果表格行
#[derive(Tabled)]
struct FrameRow {
    #[tabled(rename = "Frame")]
    frame: String,
    #[tabled(rename = "Atoms")]
    n_atoms: usize,
    #[tabled(rename = "Energy (eV)")]
    energy: String,
    #[tabled(rename = "E/atom (eV)")]
    energy_per_atom: String,
    #[tabled(rename = "Max force (eV/Å)")]
    max_force: String,
    #[tabled(rename = "Pressure (GPa)")]
    pressure: String,
}

/// 执行单点计算
pub fn execute(args: SinglePointArgs) -> Result<()> {
    output::print_header("Single Point Calculation");

    if !args.input.is_file() {
        return Err(QeosError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }

    let mut spec = CalculatorSpec::new(args.arch.as_str()).with_device(args.device);
    if let Some(model) = &args.model {
        spec = spec.with_model(model);
    }

    let mut single_point = SinglePoint::new(args.input.as_path(), Some(&spec))?;
    let first = single_point.structure();
    output::print_info(&format!("Structure: {} ({})", first.name, first.formula()));
    let results = single_point.run()?;

    if single_point.is_trajectory() {
        output::print_info(&format!("Evaluated {} frames", results.len()));
    }

    let rows: Vec<FrameRow> = single_point
        .frames()
        .iter()
        .zip(&results)
        .map(|(frame, props)| frame_row(frame, props))
        .collect();
    println!("{}", Table::new(&rows));

    output::print_done(&format!("Calculator: {} ({})", spec.arch, spec.device));
    Ok(())
}

fn frame_row(frame: &Crystal, props: &Properties) -> FrameRow {
    // 非周期结构没有压强
    let periodic = frame.pbc.iter().any(|&p| p);
    FrameRow {
        frame: frame.name.clone(),
        n_atoms: frame.atoms.len(),
        energy: format!("{:.6}", props.energy),
        energy_per_atom: props
            .energy_per_atom()
            .map(|e| format!("{:.6}", e))
            .unwrap_or_else(|| "-".to_string()),
        max_force: format!("{:.4}", props.max_force()),
        pressure: if periodic {
            format!("{:.4}", props.pressure() * EV_PER_A3_TO_GPA)
        } else {
            "-".to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};

    #[test]
    fn test_frame_row() {
        let atoms = vec![
            Atom::new("Ar", [0.0, 0.0, 0.0]),
            Atom::new("Ar", [0.38, 0.0, 0.0]),
        ];
        let crystal = Crystal::new("dimer", Lattice::cubic(10.0), atoms);
        let props = Properties {
            energy: -0.02,
            forces: vec![[0.01, 0.0, 0.0], [-0.01, 0.0, 0.0]],
            stress: [-0.001, -0.001, -0.001, 0.0, 0.0, 0.0],
        };

        let row = frame_row(&crystal, &props);
        assert_eq!(row.n_atoms, 2);
        assert_eq!(row.energy_per_atom, "-0.010000");
        assert_eq!(row.max_force, "0.0100");
        assert_eq!(row.pressure, "0.1602");

        let mut molecule = crystal.clone();
        molecule.pbc = [false; 3];
        assert_eq!(frame_row(&molecule, &props).pressure, "-");
    }
}
