use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, SubtractError};
use crate::fourier::{FourierVolume, FrequencyGrid};
use crate::io::{mrc, npy};
use crate::metadata::ParticleTable;
use crate::subtract::SubtractionKernel;

use super::config::{SubtractionConfig, VolumeSource};
use super::scheduler::Scheduler;
use super::store::{MrcStackStore, StackStore};
use super::types::{NoOpReporter, PipelineStage, ProgressReporter, RunSummary};

/// Load a map as a Fourier volume, transforming real-space maps with
/// `fft_threads` threads.
pub fn load_volume(source: &VolumeSource, fft_threads: usize) -> Result<FourierVolume> {
    match source {
        VolumeSource::Map(path) => {
            let (map, pixel_size) = mrc::read_volume(path)?;
            info!(path = %path.display(), shape = ?map.dim(), pixel_size, "Read map");
            FourierVolume::from_real_space(&map, fft_threads)
        }
        VolumeSource::Fourier(path) => {
            let data = npy::read_complex_volume(path)?;
            info!(path = %path.display(), shape = ?data.dim(), "Read Fourier volume");
            FourierVolume::from_array(data)
        }
    }
}

/// Check every source stack before any work: image shape must match the
/// map box and every referenced image must exist.
fn check_sources<S: StackStore + ?Sized>(
    table: &ParticleTable,
    store: &S,
    image_size: usize,
) -> Result<()> {
    let mut highest: BTreeMap<PathBuf, (usize, String)> = BTreeMap::new();
    for record in table.records() {
        let entry = highest
            .entry(record.source.stack.clone())
            .or_insert((0, String::new()));
        if record.source.index > entry.0 {
            *entry = (record.source.index, record.image_name());
        }
    }
    for (stack, (index, image)) in highest {
        let info = store.stack_info(&stack)?;
        if info.shape != (image_size, image_size) {
            return Err(SubtractError::SizeMismatch(format!(
                "images in {} are {}x{}, map box is {}",
                stack.display(),
                info.shape.1,
                info.shape.0,
                image_size
            )));
        }
        if index > info.count {
            return Err(SubtractError::ImageIndexOutOfRange {
                index,
                total: info.count,
            }
            .for_particle(image));
        }
    }
    Ok(())
}

/// Run the subtraction with a caller-supplied stack store and reporter.
pub fn run_subtraction_with_store<S: StackStore + ?Sized>(
    config: &SubtractionConfig,
    store: &S,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    reporter.begin_stage(PipelineStage::LoadingMetadata, None);
    let layout = config.layout();
    let table = ParticleTable::read(&config.input, &layout, config.pixel_size)?;
    info!(
        particles = table.len(),
        dest = %layout.dest_dir.display(),
        "Read particle metadata"
    );
    reporter.finish_stage();

    reporter.begin_stage(
        PipelineStage::TransformingVolumes,
        Some(1 + config.refmap.is_some() as usize),
    );
    let submap = Arc::new(load_volume(&config.submap, config.fft_threads)?);
    reporter.advance(1);
    let refmap = match config.refmap {
        Some(ref source) => {
            let volume = load_volume(source, config.fft_threads)?;
            reporter.advance(1);
            Some(Arc::new(volume))
        }
        None => None,
    };
    reporter.finish_stage();

    let size = submap.image_size();
    let grid = Arc::new(FrequencyGrid::new(size));
    let kernel = Arc::new(SubtractionKernel::new(submap, refmap, grid)?);
    info!(size, method = %kernel.method(), "Subtraction kernel ready");

    if table.is_empty() {
        warn!("No particles in input metadata");
    }
    check_sources(&table, store, size)?;
    let pixel_sizes = table.records().iter().map(|r| r.pixel_size);
    if let (Some(lo), Some(hi)) = (
        pixel_sizes.clone().reduce(f64::min),
        pixel_sizes.reduce(f64::max),
    ) {
        if hi - lo > 1e-3 * hi {
            warn!(min = lo, max = hi, "Particles have different pixel sizes");
        }
    }

    let dest_dir = config.dest_dir();
    if !dest_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(&dest_dir)?;
    }

    let scheduler = Scheduler::new(config.workers(), config.queue_capacity)?;
    info!(
        workers = scheduler.workers(),
        queue = scheduler.queue_capacity(),
        "Starting subtraction"
    );

    reporter.begin_stage(PipelineStage::Subtracting, Some(table.len()));
    let mut stacks = Vec::new();
    for group in table.groups() {
        stacks.push(scheduler.process_stack(&group, store, &kernel, reporter.as_ref())?);
    }
    reporter.finish_stage();

    reporter.begin_stage(PipelineStage::WritingMetadata, None);
    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    table.write_output(&config.output)?;
    info!(path = %config.output.display(), stacks = stacks.len(), "Wrote particle metadata");
    reporter.finish_stage();

    Ok(RunSummary {
        particles: table.len(),
        stacks,
    })
}

/// Run the subtraction on MRC stacks with a thread-safe progress reporter.
pub fn run_subtraction_reported(
    config: &SubtractionConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    let store = MrcStackStore::new();
    run_subtraction_with_store(config, &store, reporter)
}

/// Run the subtraction on MRC stacks.
pub fn run_subtraction(config: &SubtractionConfig) -> Result<RunSummary> {
    run_subtraction_reported(config, Arc::new(NoOpReporter))
}
