//! # EoS 结果文件
//!
//! - `<prefix>-eos-fit.dat`: 体弹模量、E₀、V₀
//! - `<prefix>-eos-raw.dat`: 每个采样点的晶格缩放因子、能量、体积
//! - `<prefix>-generated.extxyz`: 采样得到的结构
//!
//! 每次写出都会截断已有文件。
//!
//! ## 依赖关系
//! - 被 `eos/mod.rs` 调用
//! - 使用 `parsers/xyz.rs` 写扩展 XYZ

use crate::eos::EosResults;
use crate::error::{QeosError, Result};
use crate::models::Crystal;
use crate::parsers::xyz;

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<prefix><suffix>`
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| QeosError::write_error(path, e))
}

/// 写出拟合结果
pub fn write_fit_data(results: &EosResults, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    let err = |e| QeosError::write_error(path, e);

    writeln!(file, "#Bulk modulus [GPa] | E_0 [eV] | V_0 [A^3]").map_err(err)?;
    writeln!(
        file,
        "{} {} {}",
        results.bulk_modulus, results.e_0, results.v_0
    )
    .map_err(err)?;
    file.flush().map_err(err)
}

/// 写出原始采样数据
pub fn write_raw_data(results: &EosResults, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    let err = |e| QeosError::write_error(path, e);

    writeln!(file, "#Lattice Scalar | Energy [eV] | Volume [A^3]").map_err(err)?;
    for ((scalar, energy), volume) in results
        .lattice_scalars
        .iter()
        .zip(&results.energies)
        .zip(&results.volumes)
    {
        writeln!(file, "{} {} {}", scalar, energy, volume).map_err(err)?;
    }
    file.flush().map_err(err)
}

/// 逐帧写出生成的结构
pub struct GeneratedWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl GeneratedWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(GeneratedWriter {
            path: path.to_path_buf(),
            file: create(path)?,
        })
    }

    pub fn append(&mut self, crystal: &Crystal) -> Result<()> {
        self.file
            .write_all(xyz::to_extxyz_string(crystal).as_bytes())
            .map_err(|e| QeosError::write_error(&self.path, e))
    }

    pub fn finish(mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| QeosError::write_error(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_suffix() {
        let path = with_suffix(Path::new("/tmp/out/NaCl"), "-eos-fit.dat");
        assert_eq!(path, PathBuf::from("/tmp/out/NaCl-eos-fit.dat"));
    }
}
