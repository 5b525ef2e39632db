use std::panic;
use std::path::Path;

use anyhow::Result;
use dex_growth::aggregate::GrowthCountTable;
use dex_growth::{BoxStats, CurveSeries, GrowthRate};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle, FontTransform};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }

    /// SVG for a `.svg` path, PNG otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ChartKind::Svg,
            _ => ChartKind::Png,
        }
    }
}

pub enum Chart<'a> {
    GrowthCounts(&'a GrowthCountTable),
    CurveComparison(&'a [CurveSeries]),
    StatBoxes(&'a [BoxStats]),
    ExperienceBars(&'a [(String, f64)]),
}

impl Chart<'_> {
    pub fn file_stem(&self) -> &'static str {
        match self {
            Chart::GrowthCounts(_) => "growth_counts_by_type",
            Chart::CurveComparison(_) => "growth_curve_comparison",
            Chart::StatBoxes(_) => "average_stats_by_type",
            Chart::ExperienceBars(_) => "base_experience_by_type",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Chart::GrowthCounts(counts) => counts.counts.is_empty(),
            Chart::CurveComparison(curves) => curves.iter().all(|c| c.levels.is_empty()),
            Chart::StatBoxes(boxes) => boxes.is_empty(),
            Chart::ExperienceBars(means) => means.is_empty(),
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            Chart::GrowthCounts(_) => (900, 1500),
            Chart::CurveComparison(_) => (1280, 760),
            Chart::StatBoxes(_) => (1100, 900),
            Chart::ExperienceBars(_) => (1280, 760),
        }
    }
}

/// Render one chart, turning backend errors and panics into a message so a
/// failed chart never aborts the run.
pub fn render_chart_guard(chart: &Chart<'_>, path: &Path, kind: ChartKind) -> Result<(), String> {
    if chart.is_empty() {
        return Err("no data to plot".to_string());
    }
    let render = || -> Result<(), String> {
        render_chart(chart, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(chart: &Chart<'_>, path: &Path, kind: ChartKind) -> Result<()> {
    let size = chart.size();
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_chart(root, chart)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_chart(root, chart)
        }
    }
}

fn draw_chart<DB>(root: DrawingArea<DB, Shift>, chart: &Chart<'_>) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    match chart {
        Chart::GrowthCounts(counts) => draw_growth_counts(&root, counts)?,
        Chart::CurveComparison(curves) => draw_curve_comparison(&root, curves)?,
        Chart::StatBoxes(boxes) => draw_stat_boxes(&root, boxes)?,
        Chart::ExperienceBars(means) => draw_experience_bars(&root, means)?,
    }
    root.present()?;
    Ok(())
}

fn axis_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal)
}

fn caption_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 26.0, FontStyle::Normal)
}

fn legend_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal)
}

/// Category name for a tick sitting exactly on a category index.
fn category_label(names: &[&str], value: f64) -> String {
    let idx = value.round();
    if idx < 0.0 || (value - idx).abs() > 1e-6 {
        return String::new();
    }
    names
        .get(idx as usize)
        .map(|name| name.to_string())
        .unwrap_or_default()
}

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

fn palette(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

fn type_color(name: &str) -> RGBColor {
    match name {
        "normal" => RGBColor(168, 167, 122),
        "fire" => RGBColor(238, 129, 48),
        "water" => RGBColor(99, 144, 240),
        "electric" => RGBColor(247, 208, 44),
        "grass" => RGBColor(122, 199, 76),
        "ice" => RGBColor(150, 217, 214),
        "fighting" => RGBColor(194, 46, 40),
        "poison" => RGBColor(163, 62, 161),
        "ground" => RGBColor(226, 191, 101),
        "flying" => RGBColor(169, 143, 243),
        "psychic" => RGBColor(249, 85, 135),
        "bug" => RGBColor(166, 185, 26),
        "rock" => RGBColor(182, 161, 54),
        "ghost" => RGBColor(115, 87, 151),
        "dragon" => RGBColor(111, 53, 252),
        "dark" => RGBColor(112, 87, 70),
        "steel" => RGBColor(183, 183, 206),
        "fairy" => RGBColor(214, 133, 173),
        _ => RGBColor(128, 128, 128),
    }
}

fn curve_color(rate: GrowthRate) -> RGBColor {
    match rate {
        GrowthRate::Medium => RGBColor(220, 20, 60),
        GrowthRate::MediumSlow => RGBColor(30, 144, 255),
        GrowthRate::Slow => RGBColor(34, 139, 34),
        GrowthRate::Fast => RGBColor(0, 170, 170),
        GrowthRate::SlowThenVeryFast => RGBColor(200, 0, 200),
        GrowthRate::FastThenVerySlow => RGBColor(255, 140, 0),
    }
}

fn draw_growth_counts<DB>(area: &DrawingArea<DB, Shift>, counts: &GrowthCountTable) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let categories: Vec<&str> = counts.categories().collect();
    let n = categories.len();
    let x_max = (counts.max_count() as f64 * 1.1).max(1.0);

    let mut chart = ChartBuilder::on(area)
        .caption("Growth Rates for Each Type", caption_font())
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0.0..x_max, -0.5..(n as f64 - 0.5))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|v| category_label(&categories, *v))
        .x_label_formatter(&|v| format!("{:.0}", v))
        .x_desc("Count")
        .label_style(axis_font())
        .draw()?;

    let groups = counts.growth_labels.len().max(1);
    let band = 0.8 / groups as f64;
    for (g, label) in counts.growth_labels.iter().enumerate() {
        let color = palette(g);
        let bars: Vec<Rectangle<(f64, f64)>> = categories
            .iter()
            .enumerate()
            .filter_map(|(i, category)| {
                let count = counts.get(category, label);
                if count == 0 {
                    return None;
                }
                let y0 = i as f64 - 0.4 + g as f64 * band;
                Some(Rectangle::new(
                    [(0.0, y0), (count as f64, y0 + band)],
                    color.filled(),
                ))
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font())
        .position(SeriesLabelPosition::LowerRight)
        .draw()?;

    Ok(())
}

fn draw_curve_comparison<DB>(area: &DrawingArea<DB, Shift>, curves: &[CurveSeries]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_max = curves
        .iter()
        .flat_map(|c| c.levels.iter().copied())
        .max()
        .unwrap_or(0) as f64
        + 1.0;
    let y_min = curves
        .iter()
        .map(CurveSeries::min_experience)
        .fold(0.0, f64::min);
    let y_max = curves
        .iter()
        .map(CurveSeries::max_experience)
        .fold(1.0, f64::max)
        * 1.05;

    let mut chart = ChartBuilder::on(area)
        .caption("Comparison of Different Growth Rates", caption_font())
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Level")
        .y_desc("EXP Points Needed to Level Up")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font())
        .draw()?;

    for (idx, curve) in curves.iter().enumerate() {
        let color = curve_color(curve.rate);
        chart
            .draw_series(LineSeries::new(curve.points(), color.stroke_width(2)))?
            .label(curve.rate.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));

        match idx % 3 {
            0 => {
                chart.draw_series(curve.points().map(|p| Circle::new(p, 4, color.filled())))?;
            }
            1 => {
                chart.draw_series(
                    curve
                        .points()
                        .map(|p| TriangleMarker::new(p, 5, color.filled())),
                )?;
            }
            _ => {
                chart.draw_series(curve.points().map(|p| Cross::new(p, 4, color)))?;
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font())
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    Ok(())
}

fn draw_stat_boxes<DB>(area: &DrawingArea<DB, Shift>, boxes: &[BoxStats]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let names: Vec<&str> = boxes.iter().map(|b| b.category.as_str()).collect();
    let n = boxes.len();
    let lo = boxes
        .iter()
        .flat_map(|b| b.outliers.iter().copied().chain([b.lower_whisker]))
        .fold(f64::INFINITY, f64::min);
    let hi = boxes
        .iter()
        .flat_map(|b| b.outliers.iter().copied().chain([b.upper_whisker]))
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = ((hi - lo) * 0.05).max(1.0);

    let mut chart = ChartBuilder::on(area)
        .caption("Average Base Stats by Type", caption_font())
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d((lo - pad)..(hi + pad), -0.5..(n as f64 - 0.5))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|v| category_label(&names, *v))
        .x_label_formatter(&|v| format!("{:.0}", v))
        .x_desc("Average base stat")
        .label_style(axis_font())
        .draw()?;

    for (i, stats) in boxes.iter().enumerate() {
        let y = i as f64;
        let color = type_color(&stats.category);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(stats.q1, y - 0.3), (stats.q3, y + 0.3)],
            color.mix(0.7).filled(),
        )))?;
        chart.draw_series(vec![
            PathElement::new(
                vec![
                    (stats.q1, y - 0.3),
                    (stats.q3, y - 0.3),
                    (stats.q3, y + 0.3),
                    (stats.q1, y + 0.3),
                    (stats.q1, y - 0.3),
                ],
                BLACK.stroke_width(1),
            ),
            PathElement::new(
                vec![(stats.median, y - 0.3), (stats.median, y + 0.3)],
                BLACK.stroke_width(2),
            ),
            PathElement::new(
                vec![(stats.lower_whisker, y), (stats.q1, y)],
                BLACK.stroke_width(1),
            ),
            PathElement::new(
                vec![(stats.q3, y), (stats.upper_whisker, y)],
                BLACK.stroke_width(1),
            ),
            PathElement::new(
                vec![(stats.lower_whisker, y - 0.15), (stats.lower_whisker, y + 0.15)],
                BLACK.stroke_width(1),
            ),
            PathElement::new(
                vec![(stats.upper_whisker, y - 0.15), (stats.upper_whisker, y + 0.15)],
                BLACK.stroke_width(1),
            ),
        ])?;
        chart.draw_series(
            stats
                .outliers
                .iter()
                .map(|&v| Circle::new((v, y), 3, BLACK.stroke_width(1))),
        )?;
    }

    Ok(())
}

fn draw_experience_bars<DB>(area: &DrawingArea<DB, Shift>, means: &[(String, f64)]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let names: Vec<&str> = means.iter().map(|(name, _)| name.as_str()).collect();
    let n = means.len();
    let y_max = means.iter().map(|(_, v)| *v).fold(1.0, f64::max) * 1.1;

    let mut chart = ChartBuilder::on(area)
        .caption("Mean Base Experience by Type", caption_font())
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 100)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), 0.0..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|v| category_label(&names, *v))
        .label_style(axis_font())
        .x_label_style(axis_font().transform(FontTransform::Rotate90))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .y_desc("Mean base experience")
        .draw()?;

    chart.draw_series(means.iter().enumerate().map(|(i, (name, mean))| {
        Rectangle::new(
            [(i as f64 - 0.4, 0.0), (i as f64 + 0.4, *mean)],
            type_color(name).filled(),
        )
    }))?;

    Ok(())
}
