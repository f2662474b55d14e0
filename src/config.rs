//! # 运行配置文件
//!
//! 从 TOML 文件读取 EoS 运行配置，未写出的字段取默认值：
//! ```toml
//! eos_type = "vinet"
//! n_volumes = 9
//! file_prefix = "out/NaCl"
//!
//! [calculator]
//! arch = "pair"
//! model = "nacl.toml"
//!
//! [minimize_kwargs]
//! fmax = 0.05
//! filter = "unit_cell"
//! ```
//! 命令行参数会覆盖文件中的值。
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 使用
//! - 使用 `toml`、`serde`

use crate::eos::EosConfig;
use crate::error::{QeosError, Result};

use std::fs;
use std::path::Path;

/// 读取 EoS 配置文件
pub fn load_eos_config(path: &Path) -> Result<EosConfig> {
    let content = fs::read_to_string(path).map_err(|e| QeosError::read_error(path, e))?;
    parse_eos_config(&content).map_err(|reason| QeosError::ConfigError {
        path: path.display().to_string(),
        reason,
    })
}

/// 解析 TOML 配置文本
pub fn parse_eos_config(content: &str) -> std::result::Result<EosConfig, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eos::EosType;
    use crate::optimize::{FilterKind, OptimizerKind};
    use std::path::PathBuf;

    #[test]
    fn test_parse_full_config() {
        let config = parse_eos_config(
            r#"
eos_type = "vinet"
n_volumes = 9
minimize_all = true
file_prefix = "out/NaCl"

[calculator]
arch = "pair"
model = "nacl.toml"

[minimize_kwargs]
fmax = 0.05
filter = "unit_cell"
optimizer = "steepest_descent"

[log]
level = "debug"

[tracker]
carbon_intensity = 0.2
"#,
        )
        .unwrap();

        assert_eq!(config.eos_type, EosType::Vinet);
        assert_eq!(config.n_volumes, 9);
        assert!(config.minimize_all);
        assert_eq!(config.file_prefix, Some(PathBuf::from("out/NaCl")));

        let calc = config.calculator.as_ref().unwrap();
        assert_eq!(calc.arch, "pair");
        assert_eq!(calc.model, Some(PathBuf::from("nacl.toml")));

        assert_eq!(config.minimize_kwargs.fmax, 0.05);
        assert_eq!(config.minimize_kwargs.steps, 1000);
        assert_eq!(config.minimize_kwargs.filter, FilterKind::UnitCell);
        assert_eq!(config.minimize_kwargs.optimizer, OptimizerKind::SteepestDescent);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.tracker.carbon_intensity, 0.2);
        assert_eq!(config.tracker.power_watts, 42.5);
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse_eos_config("").unwrap(), EosConfig::default());
    }

    #[test]
    fn test_unknown_eos_type() {
        assert!(parse_eos_config("eos_type = \"bm3\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_eos_config(Path::new("/nonexistent/qeos.toml")).unwrap_err();
        assert!(matches!(err, QeosError::FileReadError { .. }));
    }
}
