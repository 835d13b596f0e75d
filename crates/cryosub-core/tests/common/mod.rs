#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ndarray::Array2;

use cryosub_core::error::{Result, SubtractError};
use cryosub_core::fourier::Spectrum;
use cryosub_core::io::mrc_writer::write_stack;
use cryosub_core::metadata::StackGroup;
use cryosub_core::particle::{
    CtfParams, Destination, EulerAngles, ImageRef, OriginShift, ParticleRecord,
};
use cryosub_core::pipeline::{StackInfo, StackSink, StackStore, Subtractor};

/// Smooth, non-symmetric test image whose values depend on `seed`.
pub fn pattern_image(n: usize, seed: f32) -> Array2<f32> {
    Array2::from_shape_fn((n, n), |(y, x)| {
        let (y, x) = (y as f32, x as f32);
        (0.3 * x + seed).sin() + (0.17 * y - 0.5 * seed).cos() + 0.01 * x * y
    })
}

/// Write `count` pattern images of size `n` to an MRC stack.
pub fn write_pattern_stack(path: &Path, n: usize, count: usize) -> Vec<Array2<f32>> {
    let images: Vec<Array2<f32>> = (0..count).map(|i| pattern_image(n, i as f32)).collect();
    write_stack(path, &images, 1.5).unwrap();
    images
}

/// RELION 3.1 style particle STAR text with an optics table.
/// Each row references `image_names[i]`.
pub fn particle_star(image_names: &[String], pixel_size: f64) -> String {
    let mut text = String::new();
    text.push_str("# test particles\n\ndata_optics\n\nloop_\n");
    text.push_str("_rlnOpticsGroup #1\n_rlnVoltage #2\n_rlnSphericalAberration #3\n");
    text.push_str("_rlnAmplitudeContrast #4\n_rlnImagePixelSize #5\n");
    text.push_str(&format!("1 300.0 2.7 0.1 {}\n\n", pixel_size));
    text.push_str("data_particles\n\nloop_\n");
    for (i, label) in [
        "rlnImageName",
        "rlnDefocusU",
        "rlnDefocusV",
        "rlnDefocusAngle",
        "rlnPhaseShift",
        "rlnAngleRot",
        "rlnAngleTilt",
        "rlnAnglePsi",
        "rlnOriginXAngst",
        "rlnOriginYAngst",
        "rlnOpticsGroup",
    ]
    .iter()
    .enumerate()
    {
        text.push_str(&format!("_{} #{}\n", label, i + 1));
    }
    for (i, name) in image_names.iter().enumerate() {
        text.push_str(&format!(
            "{} {} {} 12.5 0.0 {} {} {} 1.5 -3.0 1\n",
            name,
            15000.0 + 100.0 * i as f64,
            14500.0 + 100.0 * i as f64,
            10.0 * i as f64,
            45.0,
            5.0 * i as f64,
        ));
    }
    text
}

pub fn image_name(index: usize, stack: &Path) -> String {
    format!("{:06}@{}", index, stack.display())
}

/// A particle reading `source_index` (1-based) of `source` and writing
/// `dest_index` (0-based) of `dest`.
pub fn record(source: &Path, source_index: usize, dest: &Path, dest_index: usize) -> ParticleRecord {
    ParticleRecord {
        row: dest_index,
        source: ImageRef {
            stack: source.to_path_buf(),
            index: source_index,
        },
        destination: Destination {
            stack: dest.to_path_buf(),
            index: dest_index,
        },
        ctf: CtfParams::default(),
        euler: EulerAngles {
            rot: 10.0 * dest_index as f64,
            tilt: 60.0,
            psi: -20.0,
        },
        origin: OriginShift { x: 1.0, y: -0.5 },
        pixel_size: 1.5,
    }
}

/// One output stack holding particles `1..=count` of `source`, in order.
pub fn group(source: &Path, dest: &Path, count: usize) -> StackGroup {
    StackGroup {
        path: dest.to_path_buf(),
        particles: (0..count).map(|i| record(source, i + 1, dest, i)).collect(),
    }
}

type Written = Arc<Mutex<HashMap<PathBuf, Vec<Array2<f32>>>>>;

/// In-memory stack store. Committed stacks are visible in `written`.
pub struct MemoryStore {
    pub sources: HashMap<PathBuf, Vec<Array2<f32>>>,
    pub written: Written,
    /// Reading this 1-based index fails with an I/O error.
    pub fail_read_at: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            written: Arc::new(Mutex::new(HashMap::new())),
            fail_read_at: None,
        }
    }

    pub fn with_source(mut self, path: &Path, images: Vec<Array2<f32>>) -> Self {
        self.sources.insert(path.to_path_buf(), images);
        self
    }

    pub fn output(&self, path: &Path) -> Option<Vec<Array2<f32>>> {
        self.written.lock().unwrap().get(path).cloned()
    }
}

impl StackStore for MemoryStore {
    fn stack_info(&self, stack: &Path) -> Result<StackInfo> {
        let images = self.sources.get(stack).ok_or_else(|| {
            SubtractError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                stack.display().to_string(),
            ))
        })?;
        Ok(StackInfo {
            shape: images.first().map(|i| i.dim()).unwrap_or((0, 0)),
            count: images.len(),
        })
    }

    fn read_particle(&self, image: &ImageRef) -> Result<Array2<f32>> {
        if self.fail_read_at == Some(image.index) {
            return Err(SubtractError::Io(std::io::Error::other("injected read failure")));
        }
        let images = self.sources.get(&image.stack).ok_or_else(|| {
            SubtractError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                image.stack.display().to_string(),
            ))
        })?;
        images
            .get(image.index - 1)
            .cloned()
            .ok_or(SubtractError::ImageIndexOutOfRange {
                index: image.index,
                total: images.len(),
            })
    }

    fn create_stack(
        &self,
        path: &Path,
        _shape: (usize, usize),
        _pixel_size: f64,
    ) -> Result<Box<dyn StackSink>> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            images: Vec::new(),
            written: Arc::clone(&self.written),
        }))
    }
}

struct MemorySink {
    path: PathBuf,
    images: Vec<Array2<f32>>,
    written: Written,
}

impl StackSink for MemorySink {
    fn append(&mut self, image: &Array2<f32>) -> Result<()> {
        self.images.push(image.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let sink = *self;
        sink.written.lock().unwrap().insert(sink.path, sink.images);
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}

/// Returns its input unchanged, optionally sleeping for chosen particles.
pub struct IdentitySubtractor {
    pub size: usize,
    /// Sleep before finishing the particle with this destination index.
    pub delays: HashMap<usize, Duration>,
    /// Every call sleeps this long.
    pub base_delay: Duration,
}

impl IdentitySubtractor {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            delays: HashMap::new(),
            base_delay: Duration::ZERO,
        }
    }
}

impl Subtractor for IdentitySubtractor {
    fn image_size(&self) -> usize {
        self.size
    }

    fn subtract(&self, p1: &Spectrum, particle: &ParticleRecord) -> Result<Spectrum> {
        std::thread::sleep(self.base_delay);
        if let Some(delay) = self.delays.get(&particle.destination.index) {
            std::thread::sleep(*delay);
        }
        Ok(p1.clone())
    }
}

/// Fails (or panics) on one destination index, identity otherwise.
pub struct FailingSubtractor {
    pub size: usize,
    pub fail_at: usize,
    pub panic: bool,
}

impl Subtractor for FailingSubtractor {
    fn image_size(&self) -> usize {
        self.size
    }

    fn subtract(&self, p1: &Spectrum, particle: &ParticleRecord) -> Result<Spectrum> {
        if particle.destination.index == self.fail_at {
            if self.panic {
                panic!("injected panic at {}", self.fail_at);
            }
            return Err(SubtractError::JobFailed("injected failure".into()));
        }
        Ok(p1.clone())
    }
}

pub fn max_abs_diff(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    assert_eq!(a.dim(), b.dim());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}
