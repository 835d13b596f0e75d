use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_FFT_THREADS, DEFAULT_QUEUE_CAPACITY};
use crate::metadata::OutputLayout;

/// Where a map comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VolumeSource {
    /// Real-space MRC map, transformed at start-up.
    Map(PathBuf),
    /// Pre-computed Fourier volume in `.npy` format.
    Fourier(PathBuf),
}

impl VolumeSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Map(p) | Self::Fourier(p) => p,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtractionConfig {
    /// Input particle STAR file.
    pub input: PathBuf,
    /// Output particle STAR file.
    pub output: PathBuf,
    /// Directory for subtracted stacks. Defaults to the output STAR's directory.
    #[serde(default)]
    pub dest: Option<PathBuf>,
    /// Worker pool size. Defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Threads used when transforming real-space maps.
    #[serde(default = "default_fft_threads")]
    pub fft_threads: usize,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Most particles submitted but not yet written, per stack.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Pixel size override in Å.
    #[serde(default)]
    pub pixel_size: Option<f64>,
    /// Map whose projections are subtracted.
    pub submap: VolumeSource,
    /// Reference map; enables per-shell correlation scaling.
    #[serde(default)]
    pub refmap: Option<VolumeSource>,
}

fn default_fft_threads() -> usize {
    DEFAULT_FFT_THREADS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_suffix() -> String {
    "_subtracted".to_string()
}

impl Default for SubtractionConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("particles.star"),
            output: PathBuf::from("subtracted.star"),
            dest: None,
            workers: None,
            fft_threads: default_fft_threads(),
            prefix: String::new(),
            suffix: default_suffix(),
            queue_capacity: default_queue_capacity(),
            pixel_size: None,
            submap: VolumeSource::Map(PathBuf::from("submap.mrc")),
            refmap: None,
        }
    }
}

impl SubtractionConfig {
    pub fn workers(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn dest_dir(&self) -> PathBuf {
        match self.dest {
            Some(ref dir) => dir.clone(),
            None => self
                .output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            dest_dir: self.dest_dir(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
        }
    }
}
