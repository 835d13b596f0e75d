use std::fmt;
use std::path::PathBuf;

use crate::consts::IMAGE_INDEX_WIDTH;

/// Location of one image inside a particle stack on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub stack: PathBuf,
    /// 1-based position within the stack, as written in STAR files.
    pub index: usize,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}@{}",
            self.index,
            self.stack.display(),
            width = IMAGE_INDEX_WIDTH
        )
    }
}

/// Where a subtracted particle is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub stack: PathBuf,
    /// 0-based position, dense and increasing within `stack`.
    pub index: usize,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}@{}",
            self.index,
            self.stack.display(),
            width = IMAGE_INDEX_WIDTH
        )
    }
}

/// Per-particle optical parameters, in STAR units:
/// defocus in Å, angles in degrees, voltage in kV, Cs in mm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CtfParams {
    pub defocus_u: f64,
    pub defocus_v: f64,
    pub defocus_angle: f64,
    pub phase_shift: f64,
    pub voltage: f64,
    pub amplitude_contrast: f64,
    pub spherical_aberration: f64,
}

impl Default for CtfParams {
    fn default() -> Self {
        Self {
            defocus_u: 10_000.0,
            defocus_v: 10_000.0,
            defocus_angle: 0.0,
            phase_shift: 0.0,
            voltage: 300.0,
            amplitude_contrast: 0.1,
            spherical_aberration: 2.7,
        }
    }
}

/// ZYZ Euler angles in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EulerAngles {
    pub rot: f64,
    pub tilt: f64,
    pub psi: f64,
}

/// Particle origin offset in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OriginShift {
    pub x: f64,
    pub y: f64,
}

/// Everything the pipeline needs to know about one particle.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleRecord {
    /// Row number in the input particle table (0-based).
    pub row: usize,
    pub source: ImageRef,
    pub destination: Destination,
    pub ctf: CtfParams,
    pub euler: EulerAngles,
    pub origin: OriginShift,
    /// Å per pixel.
    pub pixel_size: f64,
}

impl ParticleRecord {
    /// Identifier used in diagnostics and in the output metadata.
    pub fn image_name(&self) -> String {
        self.source.to_string()
    }
}
