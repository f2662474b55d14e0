//! # 扩展 XYZ 格式读写
//!
//! 支持多帧 (extended) XYZ 文件：
//! ```text
//! 2
//! Lattice="5.0 0 0 0 5.0 0 0 0 5.0" Properties=species:S:1:pos:R:3 energy=-1.2 pbc="T T T"
//! Na 0.0 0.0 0.0
//! Cl 2.5 2.5 2.5
//! ```
//! 注释行中的 `Lattice` 给出晶格，其余数值型 key=value 存入 `info`。
//! 没有 `Lattice` 的帧视为非周期分子，外加 10 Å 真空盒子。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 和 `eos/` 使用
//! - 使用 `regex` 解析注释行

use crate::error::{QeosError, Result};
use crate::models::{Atom, Crystal, Lattice};

use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// 非周期帧的真空层厚度 (Å)
const VACUUM_PADDING: f64 = 10.0;

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)=("[^"]*"|\S+)"#).expect("valid key=value regex"));

/// 解析 XYZ 文件中的所有帧
pub fn parse_xyz_file(path: &Path) -> Result<Vec<Crystal>> {
    let content = fs::read_to_string(path).map_err(|e| QeosError::read_error(path, e))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    parse_xyz_content(&content, name)
}

/// 从字符串内容解析多帧 XYZ
pub fn parse_xyz_content(content: &str, default_name: &str) -> Result<Vec<Crystal>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut frames = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let header = lines[idx].trim();
        if header.is_empty() {
            idx += 1;
            continue;
        }

        let n_atoms: usize = header.parse().map_err(|_| {
            parse_error(default_name, &format!("Expected atom count at line {}", idx + 1))
        })?;
        let comment = lines.get(idx + 1).copied().unwrap_or("");
        let start = (idx + 2).min(lines.len());
        let end = (idx + 2 + n_atoms).min(lines.len());
        let atom_lines = &lines[start..end];
        if atom_lines.len() != n_atoms {
            return Err(parse_error(
                default_name,
                &format!("Frame {} is truncated", frames.len() + 1),
            ));
        }

        let name = if frames.is_empty() {
            default_name.to_string()
        } else {
            format!("{}_{}", default_name, frames.len())
        };
        frames.push(parse_frame(&name, comment, atom_lines)?);
        idx += 2 + n_atoms;
    }

    if frames.is_empty() {
        return Err(parse_error(default_name, "No frames found"));
    }
    Ok(frames)
}

fn parse_frame(name: &str, comment: &str, atom_lines: &[&str]) -> Result<Crystal> {
    let mut species = Vec::with_capacity(atom_lines.len());
    let mut cart = Vec::with_capacity(atom_lines.len());

    for (i, line) in atom_lines.iter().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let coords: Vec<f64> = parts
            .iter()
            .skip(1)
            .take(3)
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.is_empty() || coords.len() < 3 {
            return Err(parse_error(name, &format!("Invalid atom line {}", i + 1)));
        }
        species.push(parts[0].to_string());
        cart.push([coords[0], coords[1], coords[2]]);
    }

    let mut lattice = None;
    let mut pbc = None;
    let mut info = Vec::new();

    for cap in KEY_VALUE.captures_iter(comment) {
        let key = &cap[1];
        let value = cap[2].trim_matches('"');
        match key.to_lowercase().as_str() {
            "lattice" => {
                let numbers: Vec<f64> = value
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if numbers.len() != 9 {
                    return Err(parse_error(name, "Lattice must have 9 components"));
                }
                lattice = Some(Lattice::from_vectors([
                    [numbers[0], numbers[1], numbers[2]],
                    [numbers[3], numbers[4], numbers[5]],
                    [numbers[6], numbers[7], numbers[8]],
                ]));
            }
            "pbc" => {
                let flags: Vec<bool> = value
                    .split_whitespace()
                    .map(|s| matches!(s, "T" | "t" | "True" | "true" | "1"))
                    .collect();
                if flags.len() == 3 {
                    pbc = Some([flags[0], flags[1], flags[2]]);
                }
            }
            "properties" => {}
            _ => {
                if let Ok(v) = value.parse::<f64>() {
                    info.push((key.to_string(), v));
                }
            }
        }
    }

    let periodic = lattice.is_some();
    let lattice = lattice.unwrap_or_else(|| vacuum_box(&cart));

    let atoms = species
        .into_iter()
        .zip(cart.iter())
        .map(|(el, p)| Atom::new(el, lattice.cart_to_frac(p)))
        .collect();

    let mut crystal = Crystal::new(name, lattice, atoms);
    crystal.pbc = pbc.unwrap_or([periodic; 3]);
    crystal.info.extend(info);
    crystal.source_format = Some("extxyz".to_string());
    Ok(crystal)
}

/// 为分子构造正交盒子
fn vacuum_box(cart: &[[f64; 3]]) -> Lattice {
    let mut extent = [0.0_f64; 3];
    for k in 0..3 {
        let min = cart.iter().map(|p| p[k]).fold(f64::INFINITY, f64::min);
        let max = cart.iter().map(|p| p[k]).fold(f64::NEG_INFINITY, f64::max);
        extent[k] = if cart.is_empty() { 0.0 } else { max - min };
    }
    Lattice::from_vectors([
        [extent[0] + VACUUM_PADDING, 0.0, 0.0],
        [0.0, extent[1] + VACUUM_PADDING, 0.0],
        [0.0, 0.0, extent[2] + VACUUM_PADDING],
    ])
}

/// 将结构写为一帧扩展 XYZ 文本
pub fn to_extxyz_string(crystal: &Crystal) -> String {
    let mut out = String::new();
    let m = crystal.lattice.matrix;
    let pbc = crystal.pbc.map(|p| if p { "T" } else { "F" }).join(" ");

    let _ = writeln!(out, "{}", crystal.atoms.len());
    let _ = write!(
        out,
        "Lattice=\"{} {} {} {} {} {} {} {} {}\" Properties=species:S:1:pos:R:3",
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
    );
    for (key, value) in &crystal.info {
        let _ = write!(out, " {}={}", key, value);
    }
    let _ = writeln!(out, " pbc=\"{}\"", pbc);

    for (atom, p) in crystal.atoms.iter().zip(crystal.cartesian_positions()) {
        let _ = writeln!(
            out,
            "{:<3} {:16.10} {:16.10} {:16.10}",
            atom.element, p[0], p[1], p[2]
        );
    }
    out
}

fn parse_error(source: &str, reason: &str) -> QeosError {
    QeosError::ParseError {
        format: "xyz".to_string(),
        path: source.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FRAMES: &str = "3
energy=-1.5
O 0.0 0.0 0.0
H 0.96 0.0 0.0
H -0.24 0.93 0.0
3
energy=-1.4
O 0.0 0.0 0.1
H 0.97 0.0 0.0
H -0.25 0.92 0.0
";

    #[test]
    fn test_parse_multi_frame_molecule() {
        let frames = parse_xyz_content(TWO_FRAMES, "water-traj").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].atoms.len(), 3);
        assert_eq!(frames[0].pbc, [false; 3]);
        assert_eq!(frames[1].info.get("energy"), Some(&-1.4));
        assert_eq!(frames[1].name, "water-traj_1");
    }

    #[test]
    fn test_parse_periodic_frame() {
        let content = r#"2
Lattice="5.0 0.0 0.0 0.0 5.0 0.0 0.0 0.0 5.0" Properties=species:S:1:pos:R:3 pbc="T T T"
Na 0.0 0.0 0.0
Cl 2.5 2.5 2.5
"#;
        let frames = parse_xyz_content(content, "NaCl").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pbc, [true; 3]);
        let p = frames[0].atoms[1].position;
        assert!((p[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_truncated_frame() {
        let content = "3\ncomment\nO 0 0 0\n";
        assert!(parse_xyz_content(content, "bad").is_err());
    }

    #[test]
    fn test_written_frame_reads_back() {
        let content = r#"2
Lattice="4.0 0.0 0.0 0.0 4.0 0.0 0.0 0.0 4.0" pbc="T T T"
Ar 0.0 0.0 0.0
Ar 2.0 2.0 0.0
"#;
        let mut crystal = parse_xyz_content(content, "Ar").unwrap().remove(0);
        crystal.info.insert("energy".to_string(), -0.25);

        let text = to_extxyz_string(&crystal);
        let parsed = parse_xyz_content(&text, "Ar").unwrap().remove(0);
        assert_eq!(parsed.atoms.len(), 2);
        assert_eq!(parsed.info.get("energy"), Some(&-0.25));
        assert!((parsed.volume() - 64.0).abs() < 1e-8);
    }
}
