//! # 数据模型模块
//!
//! 定义统一的晶体结构和计算结果数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `calculators/`, `optimize/`, `eos/` 使用
//! - 子模块: structure, calculation, linalg

pub mod calculation;
pub mod linalg;
pub mod structure;

pub use calculation::Properties;
pub use structure::{Atom, Crystal, Lattice};
