//! # 解析器模块
//!
//! 提供结构文件的读取（CIF、扩展 XYZ、POSCAR）和扩展 XYZ 写出。
//!
//! ## 依赖关系
//! - 被 `eos/`, `single_point.rs`, `commands/` 使用
//! - 使用 `models/` 数据模型
//! - 子模块: cif, poscar, xyz

pub mod cif;
pub mod poscar;
pub mod xyz;

use crate::error::{QeosError, Result};
use crate::models::Crystal;
use std::path::Path;

/// 支持的结构文件扩展名（用于批量模式匹配）
pub const DEFAULT_PATTERN: &str = "*.cif,*.xyz,*.extxyz,POSCAR*,CONTCAR*,*.vasp";

/// 从文件路径推断格式并解析所有帧
pub fn read_structures(path: &Path) -> Result<Vec<Crystal>> {
    if !path.is_file() {
        return Err(QeosError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "cif" => cif::parse_cif_file(path),
        "xyz" | "extxyz" => xyz::parse_xyz_file(path),
        "vasp" | "poscar" => Ok(vec![poscar::parse_poscar_file(path)?]),
        _ => {
            // 可能是 POSCAR/CONTCAR (无扩展名)
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("POSCAR") || name.starts_with("CONTCAR") {
                    return Ok(vec![poscar::parse_poscar_file(path)?]);
                }
            }
            Err(QeosError::UnsupportedFormat(format!(
                "Cannot determine format for: {}",
                path.display()
            )))
        }
    }
}
