use std::path::PathBuf;

use crate::error::Result;
use crate::fourier::Spectrum;
use crate::particle::ParticleRecord;
use crate::subtract::SubtractionKernel;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    LoadingMetadata,
    TransformingVolumes,
    Subtracting,
    WritingMetadata,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadingMetadata => write!(f, "Reading particle metadata"),
            Self::TransformingVolumes => write!(f, "Transforming maps"),
            Self::Subtracting => write!(f, "Subtracting projections"),
            Self::WritingMetadata => write!(f, "Writing particle metadata"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// All methods have default no-op implementations. `advance` is called
/// from the stack writer thread once per image written.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. particle count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_subtraction` delegates.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Per-particle computation run on the worker pool.
pub trait Subtractor: Send + Sync {
    /// Box size of the images accepted by [`subtract`](Self::subtract).
    fn image_size(&self) -> usize;

    fn subtract(&self, p1: &Spectrum, particle: &ParticleRecord) -> Result<Spectrum>;
}

impl Subtractor for SubtractionKernel {
    fn image_size(&self) -> usize {
        SubtractionKernel::image_size(self)
    }

    fn subtract(&self, p1: &Spectrum, particle: &ParticleRecord) -> Result<Spectrum> {
        SubtractionKernel::subtract(self, p1, particle)
    }
}

/// Outcome of one output stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackReport {
    pub path: PathBuf,
    pub written: usize,
    /// Most jobs that were submitted but not yet written at any one time.
    pub peak_in_flight: usize,
}

/// Outcome of a whole run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub particles: usize,
    pub stacks: Vec<StackReport>,
}
