use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use cryosub_core::fourier::FourierVolume;
use cryosub_core::io::{mrc, npy};
use indicatif::ProgressBar;
use tracing::info;

#[derive(Args)]
pub struct FourierArgs {
    /// Real-space map (MRC)
    pub map: PathBuf,

    /// Output Fourier volume (.npy)
    pub output: PathBuf,

    /// Threads for the transform (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,
}

pub fn run(args: &FourierArgs) -> Result<()> {
    let threads = args.threads.unwrap_or_else(rayon::current_num_threads);
    let (map, pixel_size) = mrc::read_volume(&args.map)
        .with_context(|| format!("Failed to read map {}", args.map.display()))?;
    let (nz, ny, nx) = map.dim();
    println!("Map:         {} ({}x{}x{}, {:.3} Å/px)", args.map.display(), nx, ny, nz, pixel_size);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Transforming map");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let start = Instant::now();
    let volume = FourierVolume::from_real_space(&map, threads);
    spinner.finish_and_clear();
    let volume = volume.with_context(|| format!("Failed to transform {}", args.map.display()))?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, threads, "Map transformed");

    npy::write_complex_volume(&args.output, volume.data())
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    let (fz, fy, fx) = volume.data().dim();
    println!("Image size:  {}", volume.image_size());
    println!("Volume:      {}x{}x{} complex", fz, fy, fx);
    println!("Saved to {}", args.output.display());
    Ok(())
}
