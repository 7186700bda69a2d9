//! tessera: render cached image recipes from the command line.
//!
//! Loads an image (or creates a blank canvas), applies the operations of
//! an optional JSON recipe, and writes the result to a file, to stdout as
//! a CGI response, or as a base64 data URI. Results are cached in a
//! directory keyed by the fingerprint of the whole recipe.
//!
//! # Usage
//!
//! ```text
//! tessera --input photo.jpg --recipe thumb.json --output thumb.png
//! tessera --create 200x100 --recipe banner.json --output - --format gif
//! tessera --recipe full.json --base64
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{ArgGroup, Parser, ValueEnum};
use tessera_io::{CgiSink, DEFAULT_CACHE_DIR, LocalFs, open_dir_cache};
use tessera_pipeline::{Dimensions, Format, Pipeline, PipelineConfig, Recipe, ResampleFilter};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Render an image pipeline with transparent caching.
#[derive(Parser)]
#[command(name = "tessera", version)]
#[command(group(ArgGroup::new("source").required(true).multiple(true)))]
struct Cli {
    /// Source image (PNG, JPEG, GIF).
    #[arg(long, group = "source", conflicts_with = "create")]
    input: Option<PathBuf>,

    /// Start from a blank canvas of the given size, e.g. `200x100`.
    #[arg(long, group = "source", value_parser = parse_size)]
    create: Option<Dimensions>,

    /// JSON recipe with a source and operations. With `--input` or
    /// `--create`, only its operations are used.
    #[arg(long, group = "source")]
    recipe: Option<PathBuf>,

    /// Output file, or `-` to stream a CGI response to stdout.
    #[arg(long, required_unless_present = "base64")]
    output: Option<PathBuf>,

    /// Print the PNG result as a `data:` URI instead of writing a file.
    #[arg(long, conflicts_with = "output")]
    base64: bool,

    /// Output format. Defaults to the output file's extension, or the
    /// source extension when streaming.
    #[arg(long, value_parser = parse_format)]
    format: Option<Format>,

    /// Cache directory.
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Render without reading or writing the cache.
    #[arg(long)]
    no_cache: bool,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Directory font names are resolved against.
    #[arg(long, default_value = PipelineConfig::DEFAULT_FONTS_DIR)]
    fonts_dir: PathBuf,

    /// Resampling filter for scale operations.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resample_filter: Filter,

    /// Announce streamed output with registered MIME types instead of
    /// the legacy labels.
    #[arg(long)]
    mime_content_types: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, the individual config flags are ignored. The JSON
    /// must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResampleFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

fn parse_size(text: &str) -> Result<Dimensions, String> {
    let (width, height) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {text:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid dimension {v:?} in {text:?}"))
    };
    Ok(Dimensions::new(parse(width)?, parse(height)?))
}

fn parse_format(text: &str) -> Result<Format, String> {
    text.parse::<Format>().map_err(|e| e.to_string())
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual config flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        jpeg_quality: cli.jpeg_quality,
        fonts_dir: cli.fonts_dir.clone(),
        resample_filter: cli.resample_filter.into(),
        legacy_content_types: !cli.mime_content_types,
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_pipeline(cli: &Cli, config: PipelineConfig) -> Result<Pipeline, String> {
    let mut pipeline = Pipeline::new(Rc::new(LocalFs))
        .with_config(config)
        .map_err(|e| e.to_string())?;
    if !cli.no_cache {
        let cache = open_dir_cache(&cli.cache_dir).map_err(|e| {
            format!("Error opening cache directory {}: {e}", cli.cache_dir.display())
        })?;
        pipeline = pipeline.with_cache(Rc::new(cache));
    }

    let recipe = match cli.recipe {
        Some(ref path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
            let recipe: Recipe = serde_json::from_str(&text)
                .map_err(|e| format!("Error parsing recipe {}: {e}", path.display()))?;
            Some(recipe)
        }
        None => None,
    };

    match (&cli.input, cli.create, recipe) {
        (Some(input), _, recipe) => {
            pipeline.load(input).map_err(|e| e.to_string())?;
            add_recipe_operations(&mut pipeline, recipe)?;
        }
        (None, Some(size), recipe) => {
            pipeline
                .create(size.width, size.height)
                .map_err(|e| e.to_string())?;
            add_recipe_operations(&mut pipeline, recipe)?;
        }
        (None, None, Some(recipe)) => recipe.apply(&mut pipeline).map_err(|e| e.to_string())?,
        (None, None, None) => return Err("no source given".to_owned()),
    }
    Ok(pipeline)
}

/// Append a recipe's operations without touching the configured source.
fn add_recipe_operations(pipeline: &mut Pipeline, recipe: Option<Recipe>) -> Result<(), String> {
    let Some(recipe) = recipe else {
        return Ok(());
    };
    for spec in &recipe.operations {
        let op = spec.build(pipeline).map_err(|e| e.to_string())?;
        pipeline.push_operation(op);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let mut pipeline = build_pipeline(cli, config)?;
    info!(?pipeline, "configured pipeline");

    if cli.base64 {
        let uri = pipeline.to_base64().map_err(|e| e.to_string())?;
        println!("{uri}");
        return Ok(());
    }

    match cli.output {
        Some(ref path) if path.as_os_str() == "-" => {
            let mut sink = CgiSink::new(io::stdout().lock());
            pipeline
                .send_to(&mut sink, cli.format)
                .map_err(|e| e.to_string())?;
            sink.into_inner()
                .map_err(|e| format!("Error writing to stdout: {e}"))?;
        }
        Some(ref path) => {
            pipeline
                .save(path, cli.format)
                .map_err(|e| format!("Error saving {}: {e}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => return Err("--output or --base64 is required".to_owned()),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
