//! # VASP POSCAR 格式解析器
//!
//! 解析 VASP POSCAR/CONTCAR 文件格式。
//!
//! ## POSCAR 格式说明
//! ```text
//! Comment line (structure name)
//! 1.0                    # scaling factor (负值表示目标体积)
//! a1 a2 a3               # lattice vector a
//! b1 b2 b3               # lattice vector b
//! c1 c2 c3               # lattice vector c
//! Element1 Element2 ...  # element symbols (VASP 5+)
//! n1 n2 ...              # number of atoms per element
//! Selective dynamics     # optional
//! Direct/Cartesian       # coordinate type
//! x1 y1 z1               # atom positions
//! ...
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `models/structure.rs`

use crate::error::{QeosError, Result};
use crate::models::linalg;
use crate::models::{Atom, Crystal, Lattice};

use std::fs;
use std::path::Path;

/// 解析 POSCAR/CONTCAR 文件
pub fn parse_poscar_file(path: &Path) -> Result<Crystal> {
    let content = fs::read_to_string(path).map_err(|e| QeosError::read_error(path, e))?;

    parse_poscar_content(
        &content,
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown"),
    )
}

/// 从字符串内容解析 POSCAR 格式
pub fn parse_poscar_content(content: &str, default_name: &str) -> Result<Crystal> {
    let lines: Vec<&str> = content.lines().collect();
    let fail = |reason: &str| QeosError::ParseError {
        format: "poscar".to_string(),
        path: default_name.to_string(),
        reason: reason.to_string(),
    };

    if lines.len() < 8 {
        return Err(fail("File too short"));
    }

    let name = match lines[0].trim() {
        "" => default_name.to_string(),
        comment => comment.to_string(),
    };

    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| fail("Invalid scaling factor"))?;

    let mut matrix = [[0.0; 3]; 3];
    for (i, row) in matrix.iter_mut().enumerate() {
        let parts: Vec<f64> = lines[2 + i]
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() < 3 {
            return Err(fail(&format!("Invalid lattice vector at line {}", 3 + i)));
        }
        *row = [parts[0], parts[1], parts[2]];
    }

    // 负的缩放因子表示目标体积
    let factor = if scale < 0.0 {
        (scale.abs() / linalg::det(&matrix).abs()).cbrt()
    } else {
        scale
    };
    let lattice = Lattice::from_vectors(linalg::scale(&matrix, factor));

    let species_line: Vec<&str> = lines[5].split_whitespace().collect();
    let vasp4 = species_line
        .first()
        .map(|s| s.parse::<usize>().is_ok())
        .unwrap_or(true);

    let (elements, counts_line, mut cursor): (Vec<String>, &str, usize) = if vasp4 {
        let n = species_line.len();
        ((1..=n).map(|i| format!("X{}", i)).collect(), lines[5], 6)
    } else {
        (
            species_line.iter().map(|s| s.to_string()).collect(),
            lines[6],
            7,
        )
    };

    let counts: Vec<usize> = counts_line
        .split_whitespace()
        .map(|s| s.parse())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| fail("Invalid atom counts"))?;
    if counts.len() != elements.len() {
        return Err(fail("Element and count lines differ in length"));
    }

    if lines
        .get(cursor)
        .map(|l| l.trim().to_lowercase().starts_with('s'))
        .unwrap_or(false)
    {
        cursor += 1;
    }

    let coord_type = lines
        .get(cursor)
        .map(|l| l.trim().to_lowercase())
        .ok_or_else(|| fail("Missing coordinate type line"))?;
    let cartesian = coord_type.starts_with('c') || coord_type.starts_with('k');
    cursor += 1;

    let mut atoms = Vec::new();
    for (element, &count) in elements.iter().zip(counts.iter()) {
        for _ in 0..count {
            let line = lines
                .get(cursor)
                .ok_or_else(|| fail("Fewer positions than atom counts"))?;
            let p: Vec<f64> = line
                .split_whitespace()
                .take(3)
                .filter_map(|s| s.parse().ok())
                .collect();
            if p.len() < 3 {
                return Err(fail(&format!("Invalid position at line {}", cursor + 1)));
            }

            let position = if cartesian {
                lattice.cart_to_frac(&[p[0] * factor, p[1] * factor, p[2] * factor])
            } else {
                [p[0], p[1], p[2]]
            };
            atoms.push(Atom::new(element.clone(), position));
            cursor += 1;
        }
    }

    let mut crystal = Crystal::new(name, lattice, atoms);
    crystal.source_format = Some("poscar".to_string());

    Ok(crystal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poscar_vasp5() {
        let content = r#"NaCl
1.0
5.64 0.0 0.0
0.0 5.64 0.0
0.0 0.0 5.64
Na Cl
4 4
Direct
0.0 0.0 0.0
0.5 0.5 0.0
0.5 0.0 0.5
0.0 0.5 0.5
0.5 0.0 0.0
0.0 0.5 0.0
0.0 0.0 0.5
0.5 0.5 0.5
"#;
        let crystal = parse_poscar_content(content, "NaCl").unwrap();
        assert_eq!(crystal.name, "NaCl");
        assert_eq!(crystal.atoms.len(), 8);
        assert_eq!(crystal.atoms.iter().filter(|a| a.element == "Cl").count(), 4);
    }

    #[test]
    fn test_parse_poscar_negative_scale_is_volume() {
        let content = r#"Si
-64.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Si
1
Direct
0.0 0.0 0.0
"#;
        let crystal = parse_poscar_content(content, "Si").unwrap();
        assert!((crystal.volume() - 64.0).abs() < 1e-8);
    }

    #[test]
    fn test_parse_poscar_cartesian_selective() {
        let content = r#"Fe
1.0
2.0 0.0 0.0
0.0 2.0 0.0
0.0 0.0 2.0
Fe
2
Selective dynamics
Cartesian
0.0 0.0 0.0 T T T
1.0 1.0 1.0 F F F
"#;
        let crystal = parse_poscar_content(content, "Fe").unwrap();
        assert_eq!(crystal.atoms.len(), 2);
        assert!((crystal.atoms[1].position[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_missing_positions_is_error() {
        let content = "X\n1.0\n1 0 0\n0 1 0\n0 0 1\nH\n2\nDirect\n0 0 0\n";
        assert!(parse_poscar_content(content, "X").is_err());
    }
}
