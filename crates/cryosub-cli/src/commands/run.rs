use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use cryosub_core::consts::{DEFAULT_FFT_THREADS, DEFAULT_QUEUE_CAPACITY};
use cryosub_core::pipeline::{run_subtraction_reported, SubtractionConfig, VolumeSource};

use crate::progress::BarReporter;
use crate::summary::{print_run_result, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    /// Input particle STAR file
    pub input: Option<PathBuf>,

    /// Output particle STAR file
    pub output: Option<PathBuf>,

    /// Config file (TOML); replaces all other options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Map to subtract (real-space MRC)
    #[arg(long, conflicts_with = "submap_ft")]
    pub submap: Option<PathBuf>,

    /// Map to subtract, as a precomputed Fourier volume (.npy)
    #[arg(long)]
    pub submap_ft: Option<PathBuf>,

    /// Reference map for per-shell scaling (real-space MRC)
    #[arg(long, conflicts_with = "refmap_ft")]
    pub refmap: Option<PathBuf>,

    /// Reference map, as a precomputed Fourier volume (.npy)
    #[arg(long)]
    pub refmap_ft: Option<PathBuf>,

    /// Directory for subtracted stacks (default: next to the output STAR)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long)]
    pub nproc: Option<usize>,

    /// Threads for the map transform
    #[arg(long, default_value_t = DEFAULT_FFT_THREADS)]
    pub fft_threads: usize,

    /// Prefix for subtracted stack names
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Suffix for subtracted stack names
    #[arg(long, default_value = "_subtracted")]
    pub suffix: String,

    /// Most particles in flight per stack
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue: usize,

    /// Pixel size in Å (overrides the STAR file)
    #[arg(long)]
    pub apix: Option<f64>,
}

fn volume_source(map: &Option<PathBuf>, ft: &Option<PathBuf>) -> Option<VolumeSource> {
    match (map, ft) {
        (Some(path), _) => Some(VolumeSource::Map(path.clone())),
        (None, Some(path)) => Some(VolumeSource::Fourier(path.clone())),
        (None, None) => None,
    }
}

fn build_config_from_args(args: &RunArgs) -> Result<SubtractionConfig> {
    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        bail!("Input and output STAR files are required unless --config is given");
    };
    let Some(submap) = volume_source(&args.submap, &args.submap_ft) else {
        bail!("One of --submap or --submap-ft is required");
    };

    Ok(SubtractionConfig {
        input: input.clone(),
        output: output.clone(),
        dest: args.dest.clone(),
        submap,
        refmap: volume_source(&args.refmap, &args.refmap_ft),
        workers: args.nproc,
        fft_threads: args.fft_threads,
        prefix: args.prefix.clone(),
        suffix: args.suffix.clone(),
        queue_capacity: args.queue,
        pixel_size: args.apix,
    })
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config: SubtractionConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid subtraction config")?
    } else {
        build_config_from_args(args)?
    };

    print_run_summary(&config);

    let reporter = Arc::new(BarReporter::new());
    let summary = run_subtraction_reported(&config, reporter.clone())
        .with_context(|| format!("Subtraction of {} failed", config.input.display()));
    reporter.clear();
    let summary = summary?;

    print_run_result(&summary, &config);
    Ok(())
}
