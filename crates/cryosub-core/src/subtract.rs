use std::sync::Arc;

use ndarray::{Array2, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::correlation::{bin_correlation, broadcast};
use crate::ctf::{ctf_grid, CtfEnvelope};
use crate::error::{Result, SubtractError};
use crate::fourier::{interpolate_slice, FourierVolume, FrequencyGrid, Spectrum};
use crate::particle::{OriginShift, ParticleRecord};

/// How the subtracted projection is weighted before subtraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMethod {
    /// Subtract the CTF-weighted projection as is.
    #[default]
    None,
    /// Scale each radial shell by its correlation with a reference projection.
    Correlation,
}

impl std::fmt::Display for ScalingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Correlation => write!(f, "Correlation"),
        }
    }
}

/// Phase ramp `exp(-2πi(-x·sx - y·sy))` that moves a projection centred on
/// the volume origin to the particle's origin.
pub fn phase_shift(grid: &FrequencyGrid, origin: &OriginShift) -> Array2<Complex64> {
    let mut out = Array2::<Complex64>::zeros(grid.shape());
    let tau = std::f64::consts::TAU;
    Zip::from(&mut out)
        .and(&grid.sx)
        .and(&grid.sy)
        .for_each(|p, &sx, &sy| {
            let phase = -tau * (-origin.x * sx - origin.y * sy);
            *p = Complex64::from_polar(1.0, phase);
        });
    out
}

/// Particle CTF over the grid, with the Nyquist low-pass used for subtraction.
pub fn particle_ctf(grid: &FrequencyGrid, particle: &ParticleRecord) -> Array2<f64> {
    ctf_grid(
        &grid.s,
        &grid.a,
        particle.pixel_size,
        &particle.ctf,
        &CtfEnvelope::nyquist(particle.pixel_size),
    )
}

/// Shifted central section of `volume` in the particle's orientation.
pub fn shifted_projection(
    volume: &FourierVolume,
    particle: &ParticleRecord,
    shift: &Array2<Complex64>,
) -> Spectrum {
    let mut slice = interpolate_slice(volume, &particle.euler.rotation());
    slice *= shift;
    slice
}

/// Per-particle subtraction: the unit of work dispatched to the pool.
///
/// Holds shared read-only volumes and grid; `subtract` has no side effects
/// and can run on many threads at once.
#[derive(Clone, Debug)]
pub struct SubtractionKernel {
    submap: Arc<FourierVolume>,
    refmap: Option<Arc<FourierVolume>>,
    grid: Arc<FrequencyGrid>,
}

impl SubtractionKernel {
    /// Build a kernel. Supplying `refmap` selects [`ScalingMethod::Correlation`].
    pub fn new(
        submap: Arc<FourierVolume>,
        refmap: Option<Arc<FourierVolume>>,
        grid: Arc<FrequencyGrid>,
    ) -> Result<Self> {
        let size = submap.image_size();
        if let Some(ref reference) = refmap {
            if reference.data().dim() != submap.data().dim() {
                return Err(SubtractError::SizeMismatch(format!(
                    "reference map box {} does not match subtraction map box {}",
                    reference.image_size(),
                    size
                )));
            }
        }
        if grid.size != size {
            return Err(SubtractError::SizeMismatch(format!(
                "frequency grid box {} does not match map box {}",
                grid.size, size
            )));
        }
        Ok(Self {
            submap,
            refmap,
            grid,
        })
    }

    pub fn method(&self) -> ScalingMethod {
        if self.refmap.is_some() {
            ScalingMethod::Correlation
        } else {
            ScalingMethod::None
        }
    }

    pub fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    /// Box size of the particle images this kernel accepts.
    pub fn image_size(&self) -> usize {
        self.grid.size
    }

    /// Subtract the particle's projection of the subtraction map from `p1`.
    pub fn subtract(&self, p1: &Spectrum, particle: &ParticleRecord) -> Result<Spectrum> {
        if p1.dim() != self.grid.shape() {
            return Err(SubtractError::ShapeMismatch {
                expected: self.grid.shape(),
                actual: p1.dim(),
            });
        }

        let ctf = particle_ctf(&self.grid, particle);
        let shift = phase_shift(&self.grid, &particle.origin);
        let p2 = shifted_projection(&self.submap, particle, &shift);

        let mut result = p1.clone();
        match self.refmap {
            None => {
                Zip::from(&mut result)
                    .and(&p2)
                    .and(&ctf)
                    .for_each(|out, &proj, &c| *out -= proj * c);
            }
            Some(ref reference) => {
                let mut p3 = shifted_projection(reference, particle, &shift);
                Zip::from(&mut p3).and(&ctf).for_each(|v, &c| *v *= c);
                let table = bin_correlation(p1, &p3, &self.grid.r, self.grid.nr)?;
                let coefs = broadcast(&table, &self.grid.r);
                Zip::from(&mut result)
                    .and(&p2)
                    .and(&ctf)
                    .and(&coefs)
                    .for_each(|out, &proj, &c, &k| *out -= proj * c * k);
            }
        }

        Ok(result)
    }
}
