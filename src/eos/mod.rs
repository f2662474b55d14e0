//! # 状态方程 (EoS) 工作流
//!
//! 对单个晶体结构：
//! 1. （可选）几何优化
//! 2. 以 `cbrt(linspace(min_volume, max_volume, n_volumes))` 缩放晶胞并计算能量
//! 3. 拟合状态方程，得到 V₀、E₀ 和体弹模量
//! 4. 写出拟合/原始数据、生成的结构、E(V) 图，记录碳排放估计
//!
//! `run()` 可重复调用：从当前（可能已优化的）结构重新开始，
//! 覆盖输出文件，日志追加写入。
//!
//! ## 依赖关系
//! - 被 `commands/eos.rs` 和 `batch/` 使用
//! - 使用 `calculators/`、`optimize/`、`parsers/`、`utils/logging.rs`、`utils/emissions.rs`
//! - 子模块: fit, output, plot

pub mod fit;
pub mod output;
pub mod plot;

pub use fit::{EosType, EquationOfState, EV_PER_A3_TO_GPA};
pub use plot::PlotConfig;

use crate::calculators::CalculatorSpec;
use crate::error::{QeosError, Result};
use crate::models::Crystal;
use crate::optimize::{FilterKind, GeomOpt, GeomOptConfig};
use crate::parsers;
use crate::utils::emissions::{EmissionsTracker, TrackerConfig};
use crate::utils::logging::{LogConfig, RunLogger};

use output::GeneratedWriter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

// ─────────────────────────────────────────────────────────────
// 输入
// ─────────────────────────────────────────────────────────────

/// 结构来源
#[derive(Debug, Clone)]
pub enum StructureSource {
    /// 结构文件路径
    Path(PathBuf),
    /// 内存中的结构
    Structure(Crystal),
    /// 多帧轨迹
    Trajectory(Vec<Crystal>),
}

impl From<&str> for StructureSource {
    fn from(path: &str) -> Self {
        StructureSource::Path(PathBuf::from(path))
    }
}

impl From<String> for StructureSource {
    fn from(path: String) -> Self {
        StructureSource::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for StructureSource {
    fn from(path: PathBuf) -> Self {
        StructureSource::Path(path)
    }
}

impl From<&Path> for StructureSource {
    fn from(path: &Path) -> Self {
        StructureSource::Path(path.to_path_buf())
    }
}

impl From<Crystal> for StructureSource {
    fn from(crystal: Crystal) -> Self {
        StructureSource::Structure(crystal)
    }
}

impl From<Vec<Crystal>> for StructureSource {
    fn from(frames: Vec<Crystal>) -> Self {
        StructureSource::Trajectory(frames)
    }
}

impl StructureSource {
    /// 解析为单个结构
    fn into_structure(self) -> Result<Crystal> {
        let frames = match self {
            StructureSource::Structure(crystal) => return Ok(crystal),
            StructureSource::Trajectory(frames) => frames,
            StructureSource::Path(path) => parsers::read_structures(&path).map_err(|e| {
                QeosError::InvalidStructure(format!(
                    "Cannot read a structure from '{}': {}",
                    path.display(),
                    e
                ))
            })?,
        };

        let n_frames = frames.len();
        match <[Crystal; 1]>::try_from(frames) {
            Ok([crystal]) => Ok(crystal),
            Err(_) => Err(QeosError::NotImplemented(format!(
                "The equation of state requires a single structure; got a trajectory of {} frames",
                n_frames
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 配置
// ─────────────────────────────────────────────────────────────

/// EoS 运行配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EosConfig {
    /// 计算器规格；为空时使用结构上已附加的计算器
    pub calculator: Option<CalculatorSpec>,
    /// 最小体积比
    pub min_volume: f64,
    /// 最大体积比
    pub max_volume: f64,
    /// 采样点数
    pub n_volumes: usize,
    /// 拟合模型
    pub eos_type: EosType,
    /// 采样前优化结构
    pub minimize: bool,
    /// 每个采样结构在固定体积下优化原子位置
    pub minimize_all: bool,
    /// 优化参数
    pub minimize_kwargs: GeomOptConfig,
    /// 写出拟合与原始数据
    pub write_results: bool,
    /// 写出生成的结构
    pub write_structures: bool,
    /// 输出文件前缀
    pub file_prefix: Option<PathBuf>,
    /// 日志
    pub log: LogConfig,
    /// 绘制 E(V) 图
    pub plot_to_file: bool,
    pub plot: PlotConfig,
    /// 估算碳排放
    pub track_carbon: bool,
    pub tracker: TrackerConfig,
}

impl Default for EosConfig {
    fn default() -> Self {
        EosConfig {
            calculator: None,
            min_volume: 0.95,
            max_volume: 1.05,
            n_volumes: 7,
            eos_type: EosType::BirchMurnaghan,
            minimize: true,
            minimize_all: false,
            minimize_kwargs: GeomOptConfig::default(),
            write_results: true,
            write_structures: false,
            file_prefix: None,
            log: LogConfig::default(),
            plot_to_file: false,
            plot: PlotConfig::default(),
            track_carbon: true,
            tracker: TrackerConfig::default(),
        }
    }
}

impl EosConfig {
    pub fn with_calculator(mut self, spec: CalculatorSpec) -> Self {
        self.calculator = Some(spec);
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.file_prefix = Some(prefix.into());
        self
    }

    /// 检查参数取值
    pub fn validate(&self) -> Result<()> {
        if !(self.min_volume > 0.0 && self.min_volume < 1.0) {
            return Err(QeosError::InvalidConfig(format!(
                "min_volume must be in (0, 1), got {}",
                self.min_volume
            )));
        }
        if !(self.max_volume > 1.0) {
            return Err(QeosError::InvalidConfig(format!(
                "max_volume must be greater than 1, got {}",
                self.max_volume
            )));
        }
        let required = self.eos_type.n_parameters();
        if self.n_volumes < required {
            return Err(QeosError::InvalidConfig(format!(
                "n_volumes must be at least {} for the {} fit, got {}",
                required, self.eos_type, self.n_volumes
            )));
        }
        if self.plot_to_file && self.plot.filename.is_none() && self.file_prefix.is_none() {
            return Err(QeosError::InvalidConfig(
                "plot_to_file requires a plot filename or a file prefix".to_string(),
            ));
        }
        for path in [self.file_prefix.as_deref(), self.plot.filename.as_deref()]
            .into_iter()
            .flatten()
        {
            check_parent_dir(path)?;
        }
        self.minimize_kwargs.validate()?;
        self.log.level_filter()?;
        if self.track_carbon {
            self.tracker.validate()?;
        }
        Ok(())
    }

    fn prefixed(&self, suffix: &str) -> Option<PathBuf> {
        self.file_prefix
            .as_deref()
            .map(|prefix| output::with_suffix(prefix, suffix))
    }

    pub fn fit_path(&self) -> Option<PathBuf> {
        self.prefixed("-eos-fit.dat")
    }

    pub fn raw_path(&self) -> Option<PathBuf> {
        self.prefixed("-eos-raw.dat")
    }

    pub fn generated_path(&self) -> Option<PathBuf> {
        self.prefixed("-generated.extxyz")
    }

    pub fn plot_path(&self) -> Option<PathBuf> {
        self.plot
            .filename
            .clone()
            .or_else(|| self.prefixed("-eos-plot.svg"))
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log
            .filename
            .clone()
            .or_else(|| self.prefixed("-eos-log.log"))
    }
}

/// 输出文件所在目录必须已存在
fn check_parent_dir(path: &Path) -> Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) if !parent.is_dir() => Err(QeosError::DirectoryNotFound {
            path: parent.display().to_string(),
        }),
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────
// 结果
// ─────────────────────────────────────────────────────────────

/// EoS 计算结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EosResults {
    /// 拟合对象
    pub eos: EquationOfState,
    /// 体弹模量 (GPa)
    pub bulk_modulus: f64,
    /// 最低能量 (eV)
    pub e_0: f64,
    /// 平衡体积 (Å³)
    pub v_0: f64,
    pub lattice_scalars: Vec<f64>,
    pub volumes: Vec<f64>,
    pub energies: Vec<f64>,
}

// ─────────────────────────────────────────────────────────────
// 工作流
// ─────────────────────────────────────────────────────────────

/// EoS 工作流
#[derive(Debug)]
pub struct Eos {
    crystal: Crystal,
    config: EosConfig,
    results: Option<EosResults>,
}

impl Eos {
    /// 构造工作流：解析结构、附加计算器并检查配置
    pub fn new(source: impl Into<StructureSource>, config: EosConfig) -> Result<Self> {
        config.validate()?;

        let mut crystal = source.into().into_structure()?;

        if let Some(spec) = &config.calculator {
            crystal.attach_calculator(spec.build()?);
        } else if !crystal.has_calculator() {
            return Err(QeosError::MissingCalculator);
        }

        Ok(Eos {
            crystal,
            config,
            results: None,
        })
    }

    pub fn config(&self) -> &EosConfig {
        &self.config
    }

    /// 当前结构（`run()` 之后为优化后的结构，`info` 中含 `emissions`）
    pub fn structure(&self) -> &Crystal {
        &self.crystal
    }

    pub fn into_structure(self) -> Crystal {
        self.crystal
    }

    /// 最近一次 `run()` 的结果
    pub fn results(&self) -> Option<&EosResults> {
        self.results.as_ref()
    }

    /// 运行完整工作流
    pub fn run(&mut self) -> Result<&EosResults> {
        let log_config = LogConfig {
            filename: self.config.log_path(),
            ..self.config.log.clone()
        };
        let logger = RunLogger::open(&log_config)?;
        let results = logger.in_scope(|| self.execute())?;
        Ok(self.results.insert(results))
    }

    fn execute(&mut self) -> Result<EosResults> {
        info!(
            "Starting equation of state calculation for {} ({})",
            self.crystal.name,
            self.crystal.formula()
        );
        if let Some(calculator) = self.crystal.calculator() {
            info!("Using calculator: {}", calculator.name());
        }

        let tracker = self
            .config
            .track_carbon
            .then(|| EmissionsTracker::start(&self.config.tracker));

        if self.config.minimize {
            GeomOpt::new(&mut self.crystal, self.config.minimize_kwargs.clone())?.run()?;
        }

        let (lattice_scalars, volumes, energies) = self.sample()?;

        info!("Fitting {} equation of state", self.config.eos_type);
        let eos = EquationOfState::fit(&volumes, &energies, self.config.eos_type)?;
        let results = EosResults {
            bulk_modulus: eos.bulk_modulus_gpa(),
            e_0: eos.e0(),
            v_0: eos.v0(),
            eos,
            lattice_scalars,
            volumes,
            energies,
        };
        info!(
            "Bulk modulus = {:.4} GPa, E_0 = {:.6} eV, V_0 = {:.4} A^3",
            results.bulk_modulus, results.e_0, results.v_0
        );

        let emissions = tracker.map(EmissionsTracker::stop);

        if self.config.write_results {
            if let (Some(fit_path), Some(raw_path)) = (self.config.fit_path(), self.config.raw_path())
            {
                output::write_fit_data(&results, &fit_path)?;
                output::write_raw_data(&results, &raw_path)?;
                info!("Results written to {}", fit_path.display());
            }
        }

        if self.config.plot_to_file {
            if let Some(plot_path) = self.config.plot_path() {
                plot::plot_eos(&results.eos, &plot_path, &self.crystal.name, &self.config.plot)?;
                info!("Plot written to {}", plot_path.display());
            }
        }

        // 输出全部成功后才更新结构
        if let Some(emissions) = emissions {
            self.crystal.info.insert("emissions".to_string(), emissions);
        }

        info!("Equation of state calculation complete");
        Ok(results)
    }

    /// 在各体积下计算能量，返回 (缩放因子, 体积, 能量)
    fn sample(&self) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let lattice_scalars: Vec<f64> = fit::linspace(
            self.config.min_volume,
            self.config.max_volume,
            self.config.n_volumes,
        )
        .into_iter()
        .map(f64::cbrt)
        .collect();

        let mut generated = match self.config.generated_path() {
            Some(path) if self.config.write_structures => Some(GeneratedWriter::create(&path)?),
            _ => None,
        };

        let mut volumes = Vec::with_capacity(lattice_scalars.len());
        let mut energies = Vec::with_capacity(lattice_scalars.len());

        info!("Calculating energies at {} volumes", lattice_scalars.len());
        for &scalar in &lattice_scalars {
            let mut crystal = self.crystal.clone();
            crystal.info.remove("emissions");
            crystal.scale_cell(scalar);

            if self.config.minimize_all {
                // 固定体积，只优化原子位置
                let config = GeomOptConfig {
                    filter: FilterKind::None,
                    ..self.config.minimize_kwargs.clone()
                };
                GeomOpt::new(&mut crystal, config)?.run()?;
            }

            let energy = crystal.potential_energy()?;
            volumes.push(crystal.volume());
            energies.push(energy);

            if let Some(writer) = generated.as_mut() {
                crystal.info.insert("energy".to_string(), energy);
                crystal.info.insert("lattice_scalar".to_string(), scalar);
                writer.append(&crystal)?;
            }
        }

        if let Some(writer) = generated {
            writer.finish()?;
        }

        Ok((lattice_scalars, volumes, energies))
    }
}
