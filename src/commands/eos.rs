//! # eos 子命令实现
//!
//! 对单个结构或目录中的全部结构计算状态方程。
//!
//! ## 功能
//! - 单文件模式：运行工作流并以表格打印拟合结果
//! - 批量模式：并行（rayon）处理目录中的结构，写出 `eos_summary.csv`
//! - 已存在拟合文件的结构默认跳过（`--overwrite` 重新计算）
//!
//! ## 依赖关系
//! - 使用 `cli/eos.rs` 定义的 EosArgs
//! - 使用 `config.rs` 读取配置文件
//! - 使用 `eos/` 运行工作流
//! - 使用 `batch/` 模块进行批量处理

use crate::batch::{self, BatchRunner, EosSummary, FileCollector, ProcessResult};
use crate::calculators::CalculatorSpec;
use crate::cli::eos::EosArgs;
use crate::config;
use crate::eos::{Eos, EosConfig};
use crate::error::{QeosError, Result};
use crate::utils::{output, progress};

use std::fs;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// 执行 EoS 计算
pub fn execute(args: EosArgs) -> Result<()> {
    output::print_header("Equation of State Calculation");

    let config = build_config(&args)?;

    if args.input.is_file() {
        execute_single_file(&args, config)
    } else if args.input.is_dir() {
        execute_batch(&args, config)
    } else {
        Err(QeosError::FileNotFound {
            path: args.input.display().to_string(),
        })
    }
}

/// 合并配置文件与命令行参数
fn build_config(args: &EosArgs) -> Result<EosConfig> {
    let mut config = match &args.config {
        Some(path) => {
            output::print_info(&format!("Loading configuration from '{}'", path.display()));
            config::load_eos_config(path)?
        }
        None => EosConfig::default(),
    };

    // --arch 只替换架构名，保留配置文件中的模型与设备
    config.calculator = match (&args.arch, config.calculator.take()) {
        (Some(arch), Some(spec)) => Some(CalculatorSpec {
            arch: arch.clone(),
            ..spec
        }),
        (Some(arch), None) => Some(CalculatorSpec::new(arch.as_str())),
        (None, spec) => spec,
    };
    if let Some(spec) = config.calculator.as_mut() {
        if let Some(model) = &args.model {
            spec.model = Some(model.clone());
        }
        if let Some(device) = args.device {
            spec.device = device;
        }
    } else {
        return Err(QeosError::MissingCalculator);
    }

    if let Some(v) = args.min_volume {
        config.min_volume = v;
    }
    if let Some(v) = args.max_volume {
        config.max_volume = v;
    }
    if let Some(n) = args.n_volumes {
        config.n_volumes = n;
    }
    if let Some(eos_type) = args.eos_type {
        config.eos_type = eos_type;
    }

    if args.no_minimize {
        config.minimize = false;
    }
    if args.minimize_all {
        config.minimize_all = true;
    }
    let kwargs = &mut config.minimize_kwargs;
    if let Some(fmax) = args.fmax {
        kwargs.fmax = fmax;
    }
    if let Some(steps) = args.steps {
        kwargs.steps = steps;
    }
    if let Some(filter) = args.filter {
        kwargs.filter = filter;
    }
    if let Some(optimizer) = args.optimizer {
        kwargs.optimizer = optimizer;
    }

    if let Some(prefix) = &args.file_prefix {
        config.file_prefix = Some(prefix.clone());
    }
    if let Some(log) = &args.log {
        config.log = config.log.with_filename(log);
    }
    if args.plot {
        config.plot_to_file = true;
    }
    if let Some(plot_file) = &args.plot_file {
        config.plot_to_file = true;
        config.plot.filename = Some(plot_file.clone());
    }
    if args.write_structures {
        config.write_structures = true;
    }
    if args.no_tracker {
        config.track_carbon = false;
    }

    Ok(config)
}

/// 输入文件的默认输出前缀：去掉扩展名
fn default_prefix(input: &Path) -> PathBuf {
    input.with_extension("")
}

// ─────────────────────────────────────────────────────────────
// 单文件模式
// ─────────────────────────────────────────────────────────────

/// 结果表格行
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Quantity")]
    quantity: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn execute_single_file(args: &EosArgs, mut config: EosConfig) -> Result<()> {
    output::print_info(&format!("Single file mode: '{}'", args.input.display()));

    if config.file_prefix.is_none() {
        config = config.with_file_prefix(default_prefix(&args.input));
    }
    print_settings(&config);

    let mut eos = Eos::new(args.input.as_path(), config)?;

    let spinner = progress::create_spinner("Running equation of state workflow");
    let outcome = eos.run().map(|_| ());
    spinner.finish_and_clear();
    outcome?;

    print_results_table(&eos);

    let config = eos.config();
    if let Some(path) = config.fit_path().filter(|_| config.write_results) {
        output::print_written("Fit data", &path);
    }
    if let Some(path) = config.generated_path().filter(|_| config.write_structures) {
        output::print_written("Generated structures", &path);
    }
    if let Some(path) = config.plot_path().filter(|_| config.plot_to_file) {
        output::print_written("Plot", &path);
    }
    if let Some(path) = config.log_path() {
        output::print_written("Log", &path);
    }
    Ok(())
}

fn print_settings(config: &EosConfig) {
    if let Some(spec) = &config.calculator {
        output::print_info(&format!("Calculator: {} ({})", spec.arch, spec.device));
    }
    output::print_info(&format!(
        "Sampling {} volumes in [{:.3}, {:.3}] x V, {} fit",
        config.n_volumes, config.min_volume, config.max_volume, config.eos_type
    ));
    if config.minimize {
        output::print_info(&format!(
            "Pre-relaxation: {} with {} filter, fmax = {} eV/Å",
            config.minimize_kwargs.optimizer, config.minimize_kwargs.filter, config.minimize_kwargs.fmax
        ));
    }
}

fn print_results_table(eos: &Eos) {
    let Some(results) = eos.results() else {
        return;
    };
    let crystal = eos.structure();
    let mut rows = vec![
        ResultRow {
            quantity: "Structure",
            value: format!("{} ({})", crystal.name, crystal.formula()),
        },
        ResultRow {
            quantity: "EoS",
            value: results.eos.eos_type().to_string(),
        },
        ResultRow {
            quantity: "Bulk modulus (GPa)",
            value: format!("{:.4}", results.bulk_modulus),
        },
        ResultRow {
            quantity: "E₀ (eV)",
            value: format!("{:.6}", results.e_0),
        },
        ResultRow {
            quantity: "V₀ (Å³)",
            value: format!("{:.4}", results.v_0),
        },
    ];
    if let Some(emissions) = crystal.info.get("emissions") {
        rows.push(ResultRow {
            quantity: "Emissions (kg CO₂eq)",
            value: format!("{:.3e}", emissions),
        });
    }

    output::print_header("Fit Results");
    println!("{}", Table::new(&rows));
}

// ─────────────────────────────────────────────────────────────
// 批量模式
// ─────────────────────────────────────────────────────────────

/// 汇总表格行
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Structure")]
    structure: String,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "B (GPa)")]
    bulk_modulus: String,
    #[tabled(rename = "E₀ (eV)")]
    e_0: String,
    #[tabled(rename = "V₀ (Å³)")]
    v_0: String,
}

fn execute_batch(args: &EosArgs, config: EosConfig) -> Result<()> {
    output::print_info(&format!("Batch mode: directory '{}'", args.input.display()));

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;
    output::print_info(&format!("Found {} structure files", files.len()));

    // 批量模式下前缀作为输出目录
    let output_dir = config.file_prefix.clone();
    if let Some(dir) = &output_dir {
        fs::create_dir_all(dir).map_err(|e| QeosError::write_error(dir, e))?;
    }
    if config.plot.filename.is_some() {
        output::print_warning("Ignoring plot filename in batch mode; plots use per-file prefixes");
    }
    print_settings(&config);

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!("Running with {} parallel jobs", runner.jobs()));

    let result = runner.run(&files, |file| {
        process_batch_file(file, &config, output_dir.as_deref(), args.overwrite)
    })?;

    output::print_separator();
    output::print_success(&format!(
        "Batch complete: {} files, {} success, {} skipped, {} failed",
        result.total(),
        result.successes.len(),
        result.skipped.len(),
        result.failures.len()
    ));

    for (path, reason) in &result.skipped {
        output::print_skip(&format!("{}: {}", path.display(), reason));
    }

    if !result.failures.is_empty() {
        output::print_warning("Failed files:");
        for (path, err) in result.failures.iter().take(10) {
            output::print_error(&format!("  {}: {}", path.display(), err));
        }
        if result.failures.len() > 10 {
            output::print_warning(&format!("  ... and {} more", result.failures.len() - 10));
        }
    }

    if result.successes.is_empty() {
        return Ok(());
    }

    let summaries: Vec<EosSummary> = result.successes.into_iter().map(|(_, s)| s).collect();
    let rows: Vec<SummaryRow> = summaries
        .iter()
        .map(|s| SummaryRow {
            structure: s.file.clone(),
            formula: s.formula.clone(),
            bulk_modulus: format!("{:.3}", s.bulk_modulus_gpa),
            e_0: format!("{:.6}", s.e_0_ev),
            v_0: format!("{:.4}", s.v_0_a3),
        })
        .collect();
    output::print_header("Fit Results");
    println!("{}", Table::new(&rows));

    let summary_path = output_dir.unwrap_or_else(|| args.input.clone()).join("eos_summary.csv");
    batch::write_summary(&summaries, &summary_path)?;
    output::print_written("Summary", &summary_path);

    Ok(())
}

/// 批量模式中单个结构的输出前缀
fn batch_prefix(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match (output_dir, input.file_stem()) {
        (Some(dir), Some(stem)) => dir.join(stem),
        _ => default_prefix(input),
    }
}

/// 处理批量模式中的单个文件
fn process_batch_file(
    input: &Path,
    base: &EosConfig,
    output_dir: Option<&Path>,
    overwrite: bool,
) -> ProcessResult<EosSummary> {
    let mut config = base.clone();
    config.file_prefix = Some(batch_prefix(input, output_dir));
    config.plot.filename = None;

    if let Some(fit_path) = config.fit_path() {
        if fit_path.exists() && !overwrite {
            return ProcessResult::Skipped(
                input.to_path_buf(),
                format!("Output exists: {}", fit_path.display()),
            );
        }
    }

    let outcome = Eos::new(input, config).and_then(|mut eos| {
        let results = eos.run()?.clone();
        let crystal = eos.into_structure();
        Ok(EosSummary::new(input, &crystal, &results))
    });

    match outcome {
        Ok(summary) => ProcessResult::Success(input.to_path_buf(), summary),
        Err(e) => ProcessResult::Failed(input.to_path_buf(), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::eos::EosType;
    use crate::optimize::FilterKind;
    use clap::Parser;

    fn parse(argv: &[&str]) -> EosArgs {
        let mut full = vec!["qeos", "eos"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Eos(args) => args,
            _ => unreachable!(),
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("qeos-eos-command-tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_lj_model(dir: &Path) -> PathBuf {
        let path = dir.join("lj.toml");
        fs::write(
            &path,
            "cutoff = 8.0\n\n[default]\nkind = \"lennard_jones\"\nepsilon = 0.05\nsigma = 2.6\n",
        )
        .unwrap();
        path
    }

    fn write_rocksalt(path: &Path) {
        fs::write(
            path,
            "8\nLattice=\"5.64 0 0 0 5.64 0 0 0 5.64\" Properties=species:S:1:pos:R:3 pbc=\"T T T\"\n\
             Na 0 0 0\nNa 0 2.82 2.82\nNa 2.82 0 2.82\nNa 2.82 2.82 0\n\
             Cl 2.82 0 0\nCl 0 2.82 0\nCl 0 0 2.82\nCl 2.82 2.82 2.82\n",
        )
        .unwrap();
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "NaCl.cif",
            "--arch",
            "lj",
            "--no-minimize",
            "--n-volumes",
            "9",
            "--eos-type",
            "murnaghan",
            "--filter",
            "none",
            "--no-tracker",
            "--plot",
        ]);
        let config = build_config(&args).unwrap();

        assert_eq!(config.calculator.as_ref().unwrap().arch, "lj");
        assert!(!config.minimize);
        assert_eq!(config.n_volumes, 9);
        assert_eq!(config.eos_type, EosType::Murnaghan);
        assert_eq!(config.minimize_kwargs.filter, FilterKind::None);
        assert!(!config.track_carbon);
        assert!(config.plot_to_file);
        assert_eq!(config.min_volume, 0.95);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = temp_dir("config-file");
        let path = dir.join("run.toml");
        fs::write(
            &path,
            "n_volumes = 11\nmax_volume = 1.1\n\n[calculator]\narch = \"morse\"\n",
        )
        .unwrap();

        let args = parse(&["NaCl.cif", "--config", path.to_str().unwrap(), "--n-volumes", "5"]);
        let config = build_config(&args).unwrap();

        assert_eq!(config.calculator.as_ref().unwrap().arch, "morse");
        assert_eq!(config.n_volumes, 5);
        assert_eq!(config.max_volume, 1.1);
    }

    #[test]
    fn test_arch_flag_keeps_config_model() {
        let dir = temp_dir("arch-override");
        let path = dir.join("run.toml");
        fs::write(
            &path,
            "[calculator]\narch = \"lj\"\nmodel = \"nacl.toml\"\ndevice = \"cuda\"\n",
        )
        .unwrap();

        let args = parse(&["NaCl.cif", "--config", path.to_str().unwrap(), "--arch", "pair"]);
        let spec = build_config(&args).unwrap().calculator.unwrap();

        assert_eq!(spec.arch, "pair");
        assert_eq!(spec.model, Some(PathBuf::from("nacl.toml")));
        assert_eq!(spec.device, crate::calculators::Device::Cuda);

        let args = parse(&[
            "NaCl.cif",
            "--config",
            path.to_str().unwrap(),
            "--arch",
            "pair",
            "--device",
            "cpu",
        ]);
        let spec = build_config(&args).unwrap().calculator.unwrap();
        assert_eq!(spec.device, crate::calculators::Device::Cpu);
    }

    #[test]
    fn test_missing_arch() {
        let args = parse(&["NaCl.cif"]);
        assert!(matches!(build_config(&args), Err(QeosError::MissingCalculator)));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(default_prefix(Path::new("runs/NaCl.cif")), PathBuf::from("runs/NaCl"));
        assert_eq!(
            batch_prefix(Path::new("runs/NaCl.cif"), Some(Path::new("out"))),
            PathBuf::from("out/NaCl")
        );
        assert_eq!(batch_prefix(Path::new("runs/POSCAR"), None), PathBuf::from("runs/POSCAR"));
    }

    #[test]
    fn test_batch_file_processed_then_skipped() {
        let dir = temp_dir("batch");
        let model = write_lj_model(&dir);
        let input = dir.join("NaCl.xyz");
        write_rocksalt(&input);

        let args = parse(&[
            dir.to_str().unwrap(),
            "--arch",
            "pair",
            "--model",
            model.to_str().unwrap(),
            "--no-minimize",
            "--no-tracker",
        ]);
        let config = build_config(&args).unwrap();

        match process_batch_file(&input, &config, None, false) {
            ProcessResult::Success(path, summary) => {
                assert_eq!(path, input);
                assert_eq!(summary.n_atoms, 8);
                assert!(summary.bulk_modulus_gpa > 0.0);
                assert!(summary.emissions_kg.is_none());
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(dir.join("NaCl-eos-fit.dat").exists());

        assert!(matches!(
            process_batch_file(&input, &config, None, false),
            ProcessResult::Skipped(..)
        ));
        assert!(matches!(
            process_batch_file(&input, &config, None, true),
            ProcessResult::Success(..)
        ));
    }

    #[test]
    fn test_batch_failure_reported() {
        let dir = temp_dir("batch-failure");
        let input = dir.join("broken.xyz");
        fs::write(&input, "not a structure\n").unwrap();

        let args = parse(&[dir.to_str().unwrap(), "--arch", "lj"]);
        let config = build_config(&args).unwrap();

        assert!(matches!(
            process_batch_file(&input, &config, None, false),
            ProcessResult::Failed(..)
        ));
    }
}
