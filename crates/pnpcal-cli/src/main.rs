//! pnpcal CLI — offline access to the calibration engine.

use clap::{Args, Parser, Subcommand};
use pnpcal::fit::{fit_circle_kasa, CircleFit};
use pnpcal::runout::{CompensationTable, RunoutCompensation, RunoutMethod, RunoutSample};
use pnpcal::{find_circular_symmetry, CalibrationConfig, SymmetryParams};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pnpcal")]
#[command(about = "Pick-and-place calibration tools: circle detection, runout fits and lookups")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate a circular feature (nozzle tip, fiducial) in an image.
    DetectCircle(DetectCircleArgs),

    /// Fit a circle to a JSON list of `[x, y]` points.
    FitCircle {
        /// Path to the points file.
        #[arg(long)]
        points: PathBuf,
    },

    /// Look up the runout offset of a tool at a nozzle angle.
    RunoutOffset {
        /// Compensation table written by a calibration (JSON).
        #[arg(long)]
        table: PathBuf,

        /// Nozzle (tool) identifier.
        #[arg(long)]
        tool: String,

        /// Commanded nozzle angle in degrees.
        #[arg(long, allow_hyphen_values = true)]
        angle: f64,
    },

    /// Fit a JSON list of runout samples and store the result for a tool.
    StoreRunout {
        /// Compensation table to update; created when missing.
        #[arg(long)]
        table: PathBuf,

        /// Nozzle (tool) identifier.
        #[arg(long)]
        tool: String,

        /// Samples file: `[{"angle": .., "offset": {..}}, ..]`.
        #[arg(long)]
        samples: PathBuf,

        /// table, model, model_no_offset or model_camera_offset.
        #[arg(long, default_value = "model")]
        method: String,
    },

    /// Print the effective calibration configuration.
    ShowConfig {
        /// Configuration file; defaults are printed when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct DetectCircleArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Seed X in pixels (default: image center).
    #[arg(long)]
    center_x: Option<i32>,

    /// Seed Y in pixels (default: image center).
    #[arg(long)]
    center_y: Option<i32>,

    /// Configuration file providing the detector parameters.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Largest feature diameter in pixels.
    #[arg(long)]
    max_diameter: Option<u32>,

    /// Smallest feature diameter in pixels.
    #[arg(long)]
    min_diameter: Option<u32>,

    /// Maximum distance of the feature center from the seed, in pixels.
    #[arg(long)]
    max_search_distance: Option<u32>,

    /// Coarse search step in pixels.
    #[arg(long)]
    sub_sampling: Option<u32>,

    /// Path to write the detection (JSON); printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl DetectCircleArgs {
    fn params(&self, base: SymmetryParams) -> SymmetryParams {
        SymmetryParams {
            max_diameter: self.max_diameter.unwrap_or(base.max_diameter),
            min_diameter: self.min_diameter.unwrap_or(base.min_diameter),
            max_search_distance: self.max_search_distance.unwrap_or(base.max_search_distance),
            sub_sampling: self.sub_sampling.unwrap_or(base.sub_sampling),
        }
    }
}

#[derive(serde::Serialize)]
struct FitReport {
    #[serde(flatten)]
    fit: CircleFit,
    rms_residual: f64,
    peak_residual: f64,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DetectCircle(args) => run_detect_circle(&args),
        Commands::FitCircle { points } => run_fit_circle(&points),
        Commands::RunoutOffset { table, tool, angle } => run_runout_offset(&table, &tool, angle),
        Commands::StoreRunout {
            table,
            tool,
            samples,
            method,
        } => run_store_runout(&table, &tool, &samples, &method),
        Commands::ShowConfig { config } => run_show_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<CalibrationConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            Ok(CalibrationConfig::from_json_file(path)?)
        }
        None => Ok(CalibrationConfig::default()),
    }
}

fn emit_json(json: &str, out: Option<&Path>) -> CliResult<()> {
    match out {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!("Results written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── detect-circle ──────────────────────────────────────────────────────

fn run_detect_circle(args: &DetectCircleArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());
    let img = image::open(&args.image)
        .map_err(|e| -> CliError { format!("failed to open {}: {e}", args.image.display()).into() })?
        .to_luma8();
    let (w, h) = img.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let config = load_config(args.config.as_deref())?;
    let params = args.params(config.symmetry);
    let cx = args.center_x.unwrap_or((w / 2) as i32);
    let cy = args.center_y.unwrap_or((h / 2) as i32);

    let circle = find_circular_symmetry(&img, cx, cy, &params)?;
    tracing::info!(
        "Circle at ({:.1}, {:.1}), diameter {:.1} px, score {:.3}",
        circle.center[0],
        circle.center[1],
        circle.diameter,
        circle.score
    );
    emit_json(&serde_json::to_string_pretty(&circle)?, args.out.as_deref())
}

// ── fit-circle ─────────────────────────────────────────────────────────

fn run_fit_circle(points_path: &Path) -> CliResult<()> {
    let data = std::fs::read_to_string(points_path)?;
    let points: Vec<[f64; 2]> = serde_json::from_str(&data)?;
    tracing::info!("Fitting {} points", points.len());

    let fit = fit_circle_kasa(&points)?;
    if fit.degenerate {
        tracing::warn!("points are coincident or collinear; reporting zero radius");
    }
    let report = FitReport {
        fit,
        rms_residual: fit.rms_residual(&points),
        peak_residual: fit.peak_residual(&points),
    };
    emit_json(&serde_json::to_string_pretty(&report)?, None)
}

// ── runout-offset ──────────────────────────────────────────────────────

fn run_runout_offset(table_path: &Path, tool: &str, angle: f64) -> CliResult<()> {
    let table = CompensationTable::from_json_file(table_path)?;
    let offset = table
        .offset(tool, angle)
        .ok_or_else(|| -> CliError { format!("no runout compensation stored for {tool}").into() })?;
    if let Some(model) = table.get(tool) {
        tracing::info!("{tool}: {:?} at {angle}°", model.method());
    }
    emit_json(&serde_json::to_string_pretty(&offset)?, None)
}

// ── store-runout ───────────────────────────────────────────────────────

fn run_store_runout(table_path: &Path, tool: &str, samples_path: &Path, method: &str) -> CliResult<()> {
    let method: RunoutMethod = serde_json::from_value(serde_json::Value::String(method.to_owned()))
        .map_err(|_| -> CliError { format!("unknown runout method {method:?}").into() })?;
    let data = std::fs::read_to_string(samples_path)?;
    let samples: Vec<RunoutSample> = serde_json::from_str(&data)?;
    tracing::info!("Fitting {} runout samples for {tool}", samples.len());

    let model = RunoutCompensation::from_samples(method, &samples)?;
    let mut table = if table_path.exists() {
        CompensationTable::from_json_file(table_path)?
    } else {
        CompensationTable::new()
    };
    if table.insert(tool, model).is_some() {
        tracing::info!("Replacing the stored compensation of {tool}");
    }
    table.save_json_file(table_path)?;
    tracing::info!("Table with {} tools written to {}", table.len(), table_path.display());
    Ok(())
}

// ── show-config ────────────────────────────────────────────────────────

fn run_show_config(path: Option<&Path>) -> CliResult<()> {
    let config = load_config(path)?;
    emit_json(&config.to_json_string()?, None)
}
