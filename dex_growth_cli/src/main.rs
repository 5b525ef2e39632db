use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use dex_growth::aggregate::{box_stats_by_category, growth_counts_by_category};
use dex_growth::growth::{
    comparison_curves, sample_levels, CurveSeries, GrowthRate, COMPARISON_RATES,
};
use dex_growth::{
    run_analysis, Analysis, Enumeration, HttpCatalog, MatchStrategy, Params, DEFAULT_BASE_URL,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::{render_chart_guard, Chart, ChartKind};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ")"
);

/// Creature catalog growth-rate and base-stat analysis
#[derive(Parser, Debug)]
#[command(author, version = LONG_VERSION, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the catalog, resolve growth rates, write tables and render charts
    Analyze(AnalyzeArgs),
    /// Render the growth-curve comparison chart without touching the network
    Curves(CurvesArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Catalog API root
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory for CSV, JSON and chart output
    #[arg(short, long, default_value = "dex_output", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// How species identifiers are discovered
    #[arg(long, value_enum, default_value_t = EnumerationOpt::Listing)]
    enumeration: EnumerationOpt,

    /// Stop after this many species
    #[arg(long)]
    max_species: Option<u32>,

    /// Concurrent requests (worker pool size)
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Page size for the species listing endpoint
    #[arg(long, default_value_t = 200)]
    page_size: u32,

    /// Retries for transient request failures
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Initial retry backoff (milliseconds, doubles per retry)
    #[arg(long, default_value_t = 500)]
    backoff_ms: u64,

    /// Per-request timeout (seconds)
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Strategy bridging growth-rate member names and species keys
    #[arg(long, value_enum, default_value_t = MatcherOpt::Substring)]
    matcher: MatcherOpt,

    /// Compare per-type counts against the catalog's type endpoint
    #[arg(long, action = ArgAction::SetTrue)]
    cross_check_types: bool,

    /// Chart image format
    #[arg(long, value_enum, default_value_t = FormatOpt::Png)]
    format: FormatOpt,

    /// Plot all six growth curves instead of the four standard ones
    #[arg(long, action = ArgAction::SetTrue)]
    all_curves: bool,

    /// Curve sampling end level (exclusive)
    #[arg(long, default_value_t = 100)]
    max_level: u32,

    /// Curve sampling step in levels
    #[arg(long, default_value_t = 5)]
    level_step: u32,

    /// Disable chart generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct CurvesArgs {
    /// Output chart path (.png or .svg)
    #[arg(short, long, default_value = "growth_curve_comparison.png")]
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Plot all six growth curves instead of the four standard ones
    #[arg(long, action = ArgAction::SetTrue)]
    all_curves: bool,

    /// Curve sampling end level (exclusive)
    #[arg(long, default_value_t = 100)]
    max_level: u32,

    /// Curve sampling step in levels
    #[arg(long, default_value_t = 5)]
    level_step: u32,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EnumerationOpt {
    Listing,
    Probe,
}

impl From<EnumerationOpt> for Enumeration {
    fn from(value: EnumerationOpt) -> Self {
        match value {
            EnumerationOpt::Listing => Enumeration::Listing,
            EnumerationOpt::Probe => Enumeration::Probe,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MatcherOpt {
    Substring,
    FormPrefix,
    Exact,
}

impl From<MatcherOpt> for MatchStrategy {
    fn from(value: MatcherOpt) -> Self {
        match value {
            MatcherOpt::Substring => MatchStrategy::Substring,
            MatcherOpt::FormPrefix => MatchStrategy::FormPrefix,
            MatcherOpt::Exact => MatchStrategy::Exact,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatOpt {
    Png,
    Svg,
}

impl From<FormatOpt> for ChartKind {
    fn from(value: FormatOpt) -> Self {
        match value {
            FormatOpt::Png => ChartKind::Png,
            FormatOpt::Svg => ChartKind::Svg,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Curves(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Curves(args) => handle_curves(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let params = Params {
        base_url: args.base_url.clone(),
        enumeration: args.enumeration.into(),
        max_species: args.max_species,
        workers: args.workers,
        listing_page_size: args.page_size,
        max_retries: args.retries,
        retry_backoff_ms: args.backoff_ms,
        timeout_secs: args.timeout,
        matcher: args.matcher.into(),
        cross_check_types: args.cross_check_types,
    };
    params.validate()?;

    let catalog = HttpCatalog::new(&params).context("failed to build HTTP client")?;
    let t_run = Instant::now();
    let analysis = run_analysis(&catalog, &params)
        .with_context(|| format!("analysis against {} failed", params.base_url))?;
    if args.profile || args.verbose {
        info!("Pipeline stage: {:.1} s", t_run.elapsed().as_secs_f64());
    }

    info!("Total species: {}", analysis.table.len());
    log_category_summary(&analysis);

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let species_path = args.out_dir.join("species.csv");
    write_species_csv(&analysis, &species_path)?;
    info!("Wrote species table: {}", species_path.display());

    let summary_path = args.out_dir.join("type_summary.csv");
    write_type_summary_csv(&analysis, &summary_path)?;
    info!("Wrote type summary: {}", summary_path.display());

    let json_path = args.out_dir.join("analysis.json");
    write_analysis_json(&analysis, &json_path)?;
    info!("Wrote analysis: {}", json_path.display());

    if args.no_plot {
        return Ok(());
    }

    let t_plot = Instant::now();
    let curves = build_curves(args.all_curves, args.max_level, args.level_step)?;
    let counts = growth_counts_by_category(&analysis.table);
    let boxes = box_stats_by_category(&analysis.table);
    let means: Vec<(String, f64)> = analysis.summary.mean_experience().into_iter().collect();
    let kind: ChartKind = args.format.into();

    let charts = [
        Chart::GrowthCounts(&counts),
        Chart::CurveComparison(&curves),
        Chart::StatBoxes(&boxes),
        Chart::ExperienceBars(&means),
    ];
    for chart in &charts {
        let path = args
            .out_dir
            .join(format!("{}.{}", chart.file_stem(), kind.extension()));
        match render_chart_guard(chart, &path, kind) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!(
                "Skipping {} ({}): {}",
                chart.file_stem(),
                path.display(),
                err
            ),
        }
    }
    if args.profile || args.verbose {
        info!(
            "Plot stage: {:.1} ms",
            t_plot.elapsed().as_secs_f64() * 1000.0
        );
    }

    Ok(())
}

fn handle_curves(args: CurvesArgs) -> Result<()> {
    let curves = build_curves(args.all_curves, args.max_level, args.level_step)?;
    let kind = ChartKind::from_path(&args.output);
    render_chart_guard(&Chart::CurveComparison(&curves), &args.output, kind)
        .map_err(|err| anyhow!("failed to render {}: {}", args.output.display(), err))?;
    info!("Wrote plot: {}", args.output.display());
    Ok(())
}

fn build_curves(all: bool, max_level: u32, step: u32) -> Result<Vec<CurveSeries>> {
    if step == 0 {
        return Err(anyhow!("--level-step must be > 0"));
    }
    let levels = sample_levels(max_level, step);
    if levels.is_empty() {
        return Err(anyhow!("--max-level must be > 0"));
    }
    let rates: &[GrowthRate] = if all {
        &GrowthRate::ALL
    } else {
        &COMPARISON_RATES
    };
    Ok(comparison_curves(rates, &levels))
}

fn log_category_summary(analysis: &Analysis) {
    for (category, stats) in &analysis.summary.by_category {
        info!(
            "{:<10} members={:>4} base_exp_sum={:>6} mean_base_exp={}",
            category,
            stats.members,
            stats.experience_sum,
            stats
                .mean_experience()
                .map_or("n/a".into(), |v| format!("{:.1}", v))
        );
    }
    for mismatch in &analysis.count_mismatches {
        info!(
            "Type '{}': {} species with it as primary type, catalog lists {}",
            mismatch.category,
            mismatch.table_count,
            mismatch
                .remote_count
                .map_or("none".into(), |c| c.to_string())
        );
    }
}

fn write_species_csv(analysis: &Analysis, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_species_rows(analysis, &mut writer)
}

fn write_species_rows<W: Write>(analysis: &Analysis, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "id",
        "species",
        "type",
        "base_experience",
        "growth",
        "growth_formula",
        "hp",
        "attack",
        "defense",
        "special_attack",
        "special_defense",
        "speed",
        "average_base_stat",
    ])?;

    for row in analysis.table.rows() {
        let mut record = vec![
            row.id.to_string(),
            row.name.clone(),
            row.primary_type.clone(),
            row.base_experience
                .map(|v| v.to_string())
                .unwrap_or_default(),
            row.growth_name().unwrap_or("").to_string(),
            row.growth
                .as_ref()
                .map(|g| g.formula_id.to_string())
                .unwrap_or_default(),
        ];
        record.extend(row.stats.as_array().iter().map(|v| v.to_string()));
        record.push(
            row.average_base_stat
                .map(|v| format!("{:.3}", v))
                .unwrap_or_default(),
        );
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_type_summary_csv(analysis: &Analysis, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record([
        "type",
        "members",
        "base_experience_sum",
        "base_experience_samples",
        "mean_base_experience",
    ])?;
    for (category, stats) in &analysis.summary.by_category {
        writer.write_record([
            category.clone(),
            stats.members.to_string(),
            stats.experience_sum.to_string(),
            stats.experience_samples.to_string(),
            stats
                .mean_experience()
                .map(|v| format!("{:.3}", v))
                .unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_analysis_json(analysis: &Analysis, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(analysis)?;
    fs::write(path, text)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
