//! spotmeter: build, inspect and run spot measuring pipelines.
//!
//! # Usage
//!
//! ```text
//! spotmeter init pipeline.json --threshold 120 --data-path "results/{stem}.csv"
//! spotmeter show pipeline.json
//! spotmeter set pipeline.json form_filter minimal_area 2500
//! spotmeter run pipeline.json image.png --overlay overlay.png
//! spotmeter batch pipeline.json images/*.png --parallel --output all.csv
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default
//! `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use spotmeter_export::ExportError;
use spotmeter_io::{FileWriter, IoError, ResultWriter, writer};
use spotmeter_pipeline::{
    CalibrationError, DefaultPipelineConfig, ParameterError, Pipeline, PipelineError,
    ProcessRegistry, ProcessingItem, RegistryError, Stage, StoreRequest, Table,
    analysis, default_pipeline, threshold,
};

/// Detect and measure spots, particles and scratches in microscopy images.
#[derive(Parser)]
#[command(name = "spotmeter", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new pipeline file from the default pipeline.
    Init(InitArgs),

    /// Print the steps and parameters of a pipeline file.
    Show {
        /// Pipeline file.
        pipeline: PathBuf,
    },

    /// List the available process steps by input stage.
    Steps,

    /// Change one parameter of a pipeline file.
    Set {
        /// Pipeline file, updated in place.
        pipeline: PathBuf,
        /// Name of the step, as printed by `show`.
        step: String,
        /// Parameter name.
        parameter: String,
        /// New value.
        value: String,
    },

    /// Run a pipeline on one image and print its results.
    Run(RunArgs),

    /// Run a pipeline on many images and collect the results.
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Where to write the pipeline file.
    output: PathBuf,

    /// Binarization threshold (fixed binarization only).
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_THRESHOLD)]
    threshold: i64,

    /// Mean filter kernel size (odd).
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_KERNEL_SIZE)]
    kernel_size: i64,

    /// Smallest feature area in square pixels.
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_MINIMAL_AREA)]
    minimal_area: i64,

    /// Smallest ratio of feature area to convex hull area.
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_SOLIDITY_LIMIT)]
    solidity_limit: f64,

    /// Drop features touching the image border.
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_EXCLUDE_BORDER, action = ArgAction::Set)]
    exclude_border: bool,

    /// Length scale for calibrated columns; 0 keeps results in pixels.
    #[arg(long, default_value_t = DefaultPipelineConfig::DEFAULT_PIXELS_PER_MICRON, conflicts_with = "catalog")]
    pixels_per_micron: f64,

    /// Calibration catalog to take the length scale from.
    #[arg(long, requires_all = ["microscope", "objective"])]
    catalog: Option<PathBuf>,

    /// Microscope entry in the catalog.
    #[arg(long, requires = "catalog")]
    microscope: Option<String>,

    /// Objective entry in the catalog.
    #[arg(long, requires = "catalog")]
    objective: Option<String>,

    /// How features are measured.
    #[arg(long, value_enum, default_value_t = Analysis::Circle)]
    analysis: Analysis,

    /// How the image is binarized.
    #[arg(long, value_enum, default_value_t = Binarization::Fixed)]
    binarization: Binarization,

    /// Overlay file written per image; `{stem}` is the image file stem.
    #[arg(long, default_value = "")]
    image_path: String,

    /// Results file written per image; `{stem}` is the image file stem.
    #[arg(long, default_value = "")]
    data_path: String,

    /// Full default pipeline config as a JSON string.
    ///
    /// When provided, the individual parameter flags are ignored.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Pipeline file.
    pipeline: PathBuf,

    /// Image to measure.
    image: PathBuf,

    /// Output format on stdout.
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Also write an overlay of contours and fits (PNG, SVG, ...).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// Pipeline file.
    pipeline: PathBuf,

    /// Images to measure.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Spread images over all cores. Row order is then unspecified.
    #[arg(long)]
    parallel: bool,

    /// Write the combined results here (`.json` or CSV) instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Measurement selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Analysis {
    /// One fitted ellipse per feature.
    Circle,
    /// One line width for all features together.
    Line,
}

/// Binarization selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Binarization {
    /// Fixed `--threshold`.
    Fixed,
    /// Threshold chosen by Otsu's method.
    Otsu,
}

/// Result format on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Comma-separated values.
    Csv,
    /// Array of JSON records.
    Json,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Batch(#[from] spotmeter_io::BatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("error parsing --config-json: {0}")]
    Config(#[source] serde_json::Error),

    #[error("pipeline has no step named `{0}`")]
    UnknownStep(String),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Init(args) => run_init(&args),
        Commands::Show { pipeline } => run_show(&pipeline),
        Commands::Steps => run_steps(),
        Commands::Set {
            pipeline,
            step,
            parameter,
            value,
        } => run_set(&pipeline, &step, &parameter, &value),
        Commands::Run(args) => run_single(&args),
        Commands::Batch(args) => run_batch(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

// -- init ------------------------------------------------------------------

/// Assemble the default pipeline config from the flags, or from
/// `--config-json` when given.
fn config_from_args(args: &InitArgs) -> Result<DefaultPipelineConfig, CliError> {
    if let Some(json) = &args.config_json {
        return serde_json::from_str(json).map_err(CliError::Config);
    }
    let pixels_per_micron = match (&args.catalog, &args.microscope, &args.objective) {
        (Some(catalog), Some(microscope), Some(objective)) => spotmeter_io::load_catalog(catalog)?
            .calibration(microscope, objective)?
            .pixels_per_micron(),
        _ => args.pixels_per_micron,
    };
    Ok(DefaultPipelineConfig {
        threshold: args.threshold,
        kernel_size: args.kernel_size,
        minimal_area: args.minimal_area,
        solidity_limit: args.solidity_limit,
        exclude_border: args.exclude_border,
        pixels_per_micron,
    })
}

fn build_pipeline(args: &InitArgs) -> Result<Pipeline, CliError> {
    let config = config_from_args(args)?;
    let mut pipeline = default_pipeline(&config)?;
    if args.binarization == Binarization::Otsu {
        pipeline = pipeline.replaced_with(threshold::otsu_step());
    }
    if args.analysis == Analysis::Line {
        pipeline = pipeline.replaced_with(analysis::line_step());
        pipeline.set_parameter(
            Stage::FeaturesFiltered,
            "pixels_per_micron",
            config.pixels_per_micron,
        )?;
    }
    if !(args.image_path.is_empty() && args.data_path.is_empty()) {
        pipeline = pipeline.replaced_with(writer::step(&args.image_path, &args.data_path)?);
    }
    Ok(pipeline)
}

fn run_init(args: &InitArgs) -> Result<(), CliError> {
    let pipeline = build_pipeline(args)?;
    spotmeter_io::save_pipeline(&pipeline, &args.output)?;
    tracing::info!(path = %args.output.display(), steps = pipeline.len(), "wrote pipeline");
    Ok(())
}

// -- show / steps / set ----------------------------------------------------

fn run_show(path: &Path) -> Result<(), CliError> {
    let pipeline = spotmeter_io::load_pipeline(path, &spotmeter_io::registry()?)?;
    print!("{pipeline}");
    Ok(())
}

fn run_steps() -> Result<(), CliError> {
    let registry = spotmeter_io::registry()?;
    print!("{}", describe_registry(&registry));
    Ok(())
}

fn describe_registry(registry: &ProcessRegistry) -> String {
    let mut out = String::new();
    for stage in Stage::ALL {
        let names: Vec<&str> = registry.for_stage(stage).collect();
        if !names.is_empty() {
            let _ = writeln!(out, "[{stage}] {}", names.join(", "));
        }
    }
    out
}

fn run_set(path: &Path, step: &str, parameter: &str, value: &str) -> Result<(), CliError> {
    let mut pipeline = spotmeter_io::load_pipeline(path, &spotmeter_io::registry()?)?;
    let target = pipeline
        .steps()
        .find(|s| s.name() == step)
        .ok_or_else(|| CliError::UnknownStep(step.to_string()))?;
    let stage = target.input_stage();
    let parsed = target
        .parameters()
        .get(parameter)
        .ok_or_else(|| ParameterError::Unknown(parameter.to_string()))?
        .parse(value)?;
    pipeline.set_parameter(stage, parameter, parsed)?;
    spotmeter_io::save_pipeline(&pipeline, path)?;
    Ok(())
}

// -- run / batch -----------------------------------------------------------

fn format_table(table: &Table, format: Format) -> Result<String, CliError> {
    Ok(match format {
        Format::Csv => spotmeter_export::to_csv(table),
        Format::Json => {
            let mut json = spotmeter_export::to_json(table)?;
            json.push('\n');
            json
        }
    })
}

fn run_single(args: &RunArgs) -> Result<(), CliError> {
    let mut pipeline = spotmeter_io::load_pipeline(&args.pipeline, &spotmeter_io::registry()?)?;
    let item = ProcessingItem::from_file(&args.image, true);
    let done = pipeline.apply_at_stage(&item)?;
    let data = done.get_data();

    if let Some(path) = &args.overlay {
        let loaded = done.get_at_stage(Stage::Loaded)?;
        let request = StoreRequest {
            image: loaded.payload(),
            contours: done.metadata().contours().unwrap_or_default(),
            data: &data,
            source: done.metadata().source(),
            shape: done.metadata().image_shape(),
        };
        if let Some(written) = FileWriter::new(path, "").store_image(&request)? {
            tracing::info!(path = %written.display(), "wrote overlay");
        }
    }

    print!("{}", format_table(&data, args.format)?);
    Ok(())
}

fn run_batch(args: &BatchArgs) -> Result<(), CliError> {
    let table = spotmeter_io::batch_process(
        &args.pipeline,
        &args.images,
        args.parallel,
        &spotmeter_io::registry()?,
    )?;
    match &args.output {
        Some(path) => {
            FileWriter::new("", path).store_data(&table)?;
            tracing::info!(path = %path.display(), rows = table.len(), "wrote results");
        }
        None => print!("{}", spotmeter_export::to_csv(&table)),
    }
    Ok(())
}
