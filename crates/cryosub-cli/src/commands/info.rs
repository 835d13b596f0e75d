use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cryosub_core::fourier::FourierVolume;
use cryosub_core::io::mrc::MrcReader;
use cryosub_core::io::npy;
use cryosub_core::io::star::StarFile;

#[derive(Args)]
pub struct InfoArgs {
    /// MRC/MRCS, STAR or NPY file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let extension = args
        .file
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "star" => star_info(&args.file),
        "npy" => npy_info(&args.file),
        _ => mrc_info(&args.file),
    }
}

fn mrc_info(path: &Path) -> Result<()> {
    let reader =
        MrcReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let h = &reader.header;

    println!("File:        {}", path.display());
    println!("Dimensions:  {}x{}x{}", h.nx, h.ny, h.nz);
    println!("Mode:        {:?}", h.mode);
    println!("Pixel size:  {:.4} Å", h.pixel_size());
    println!("Space group: {}", h.ispg);
    println!("Density:     min {} max {} mean {} rms {}", h.dmin, h.dmax, h.dmean, h.rms);
    if h.nsymbt > 0 {
        println!("Ext. header: {} bytes", h.nsymbt);
    }
    let total_mb = h.data_byte_size()? as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);
    Ok(())
}

fn star_info(path: &Path) -> Result<()> {
    let star =
        StarFile::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    println!("File:        {}", path.display());
    let particles = star.particle_block_index();
    for (i, block) in star.blocks.iter().enumerate() {
        let kind = if block.is_loop { "table" } else { "pairs" };
        let marker = if Some(i) == particles { " (particles)" } else { "" };
        println!(
            "data_{:<12}{} rows, {} columns, {}{}",
            block.name,
            block.len(),
            block.columns.len(),
            kind,
            marker
        );
    }
    Ok(())
}

fn npy_info(path: &Path) -> Result<()> {
    let data = npy::read_complex_volume(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (nz, ny, nx) = data.dim();
    println!("File:        {}", path.display());
    println!("Shape:       {}x{}x{} complex", nz, ny, nx);
    match FourierVolume::from_array(data) {
        Ok(volume) => println!("Image size:  {}", volume.image_size()),
        Err(e) => println!("Layout:      {}", e),
    }
    Ok(())
}
