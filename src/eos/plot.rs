//! # E(V) 曲线绘图
//!
//! 使用 `plotters` 绘制能量-体积样本点和拟合曲线。
//! 扩展名为 `.png` 时输出位图，其余输出 SVG。
//!
//! ## 依赖关系
//! - 被 `eos/mod.rs` 调用
//! - 使用 `eos/fit.rs` 的 EquationOfState
//! - 使用 `plotters` 渲染图表

use crate::eos::fit::EquationOfState;
use crate::error::{QeosError, Result};

use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 绘图参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// 输出文件；为空时使用 `<prefix>-eos-plot.svg`
    pub filename: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            filename: None,
            width: 800,
            height: 600,
        }
    }
}

/// 绘制 E(V) 图
pub fn plot_eos(
    eos: &EquationOfState,
    output_path: &Path,
    title: &str,
    config: &PlotConfig,
) -> Result<()> {
    let use_png = output_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"));

    let size = (config.width, config.height);
    if use_png {
        let root = BitMapBackend::new(output_path, size).into_drawing_area();
        draw_eos_chart(&root, eos, title)?;
        root.present().map_err(|e| plot_error(&e))?;
    } else {
        let root = SVGBackend::new(output_path, size).into_drawing_area();
        draw_eos_chart(&root, eos, title)?;
        root.present().map_err(|e| plot_error(&e))?;
    }
    Ok(())
}

fn plot_error(e: &impl std::fmt::Debug) -> QeosError {
    QeosError::PlotError(format!("{:?}", e))
}

/// 绘制图表主体
fn draw_eos_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    eos: &EquationOfState,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(|e| plot_error(&e))?;

    let curve = eos.curve(200);
    let samples: Vec<(f64, f64)> = eos
        .volumes()
        .iter()
        .copied()
        .zip(eos.energies().iter().copied())
        .collect();

    let (x_min, x_max) = bounds(samples.iter().map(|(v, _)| *v));
    let (y_min, y_max) = bounds(samples.iter().chain(&curve).map(|(_, e)| *e));
    let x_pad = 0.05 * (x_max - x_min).max(1e-6);
    let y_pad = 0.1 * (y_max - y_min).max(1e-6);

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (x_min - x_pad)..(x_max + x_pad),
            (y_min - y_pad)..(y_max + y_pad),
        )
        .map_err(|e| plot_error(&e))?;

    chart
        .configure_mesh()
        .x_desc("Volume (Å³)")
        .y_desc("Energy (eV)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(|e| plot_error(&e))?;

    let line_color = RGBColor(0, 102, 204);
    chart
        .draw_series(LineSeries::new(curve, line_color.stroke_width(2)))
        .map_err(|e| plot_error(&e))?
        .label(format!("{} fit", eos.eos_type()))
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line_color.stroke_width(2)));

    let marker_color = RGBColor(204, 51, 0);
    chart
        .draw_series(
            samples
                .iter()
                .map(|&(v, e)| Circle::new((v, e), 4, marker_color.filled())),
        )
        .map_err(|e| plot_error(&e))?
        .label("samples")
        .legend(move |(x, y)| Circle::new((x + 10, y), 4, marker_color.filled()));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| plot_error(&e))?;

    let summary = format!(
        "V₀ = {:.3} Å³, E₀ = {:.4} eV, B = {:.2} GPa",
        eos.v0(),
        eos.e0(),
        eos.bulk_modulus_gpa()
    );
    chart
        .draw_series(std::iter::once(Text::new(
            summary,
            (x_min, y_max + 0.5 * y_pad),
            ("sans-serif", 14).into_font().color(&BLACK),
        )))
        .map_err(|e| plot_error(&e))?;

    Ok(())
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}
