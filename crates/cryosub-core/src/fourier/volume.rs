use std::sync::Arc;

use ndarray::{Array3, Axis};
use num_complex::Complex32;
use num_traits::Zero;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use tracing::{debug, info};

use crate::consts::{PADDING_FACTOR, VOLUME_BORDER};
use crate::error::{Result, SubtractError};

use super::grid::signed_index;

/// Centred, Nyquist-limited, zero-padded half-space Fourier transform of a
/// cubic density map.
///
/// For a real map of side `L` the array has shape `(2L+3, 2L+3, L+1)`,
/// laid out `(z, y, x)`. The `z` and `y` axes are centred at index `L+1`;
/// `x` holds only non-negative frequencies (the other half follows from
/// Hermitian symmetry). Coefficients are in units of the padded grid, i.e.
/// image frequency index `k` lives at padded index `2k`.
#[derive(Clone, Debug)]
pub struct FourierVolume {
    data: Array3<Complex32>,
}

impl FourierVolume {
    /// Wrap a pre-computed array, checking it has the expected layout.
    pub fn from_array(data: Array3<Complex32>) -> Result<Self> {
        let (nz, ny, nx) = data.dim();
        if nz != ny {
            return Err(SubtractError::InvalidVolume(format!(
                "Fourier volume is not cubic: {}x{}x{}",
                nz, ny, nx
            )));
        }
        if nz < 5 || nz % 2 == 0 || nx != (nz - 1) / 2 {
            return Err(SubtractError::InvalidVolume(format!(
                "Unexpected Fourier volume shape {}x{}x{} (expected (n, n, (n-1)/2) with odd n)",
                nz, ny, nx
            )));
        }
        Ok(Self { data })
    }

    /// An all-zero volume whose slices have box size `image_size`.
    pub fn zeros(image_size: usize) -> Self {
        let n = PADDING_FACTOR * image_size + VOLUME_BORDER;
        Self {
            data: Array3::zeros((n, n, image_size + 1)),
        }
    }

    /// Transform a real-space map using a dedicated pool of `threads` workers.
    pub fn from_real_space(map: &Array3<f32>, threads: usize) -> Result<Self> {
        let (nz, ny, nx) = map.dim();
        if nz != ny || ny != nx {
            return Err(SubtractError::InvalidVolume(format!(
                "Map is not cubic: {}x{}x{}",
                nx, ny, nz
            )));
        }
        if nx < 2 || nx % 2 != 0 {
            return Err(SubtractError::InvalidVolume(format!(
                "Map box size must be even, got {}",
                nx
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()?;
        info!(size = nx, threads = threads.max(1), "Transforming volume");

        let data = pool.install(|| {
            let corrected = grid_correct(map);
            let ft = padded_half_fft(&corrected);
            centre_and_limit(&ft, nx)
        });
        debug!(shape = ?data.dim(), "Fourier volume ready");
        Ok(Self { data })
    }

    pub fn data(&self) -> &Array3<Complex32> {
        &self.data
    }

    /// Box size of the 2D images whose slices this volume provides.
    pub fn image_size(&self) -> usize {
        self.data.dim().0 / 2 - 1
    }

    /// Index of the zero frequency along the centred `z` and `y` axes.
    pub fn centre(&self) -> usize {
        self.data.dim().0 / 2
    }

    /// Coefficient at signed padded-grid coordinates, zero outside storage.
    /// Requires `x >= 0`.
    #[inline]
    pub fn at(&self, z: i64, y: i64, x: i64) -> Complex32 {
        let (nz, ny, nx) = self.data.dim();
        let c = self.centre() as i64;
        let (iz, iy) = (z + c, y + c);
        if iz < 0 || iy < 0 || x < 0 || iz >= nz as i64 || iy >= ny as i64 || x >= nx as i64 {
            return Complex32::zero();
        }
        self.data[[iz as usize, iy as usize, x as usize]]
    }
}

/// Divide a map by the squared sinc of its radius, pre-compensating the
/// attenuation of trilinear interpolation on a grid padded by
/// [`PADDING_FACTOR`].
pub fn grid_correct(map: &Array3<f32>) -> Array3<f32> {
    let n = map.dim().0;
    let half = (n / 2) as f64;
    let norm = 1.0 / (n * PADDING_FACTOR) as f64;

    let mut out = map.clone();
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(z, mut plane)| {
            let dz = z as f64 - half;
            for ((y, x), v) in plane.indexed_iter_mut() {
                let dy = y as f64 - half;
                let dx = x as f64 - half;
                let r = (dx * dx + dy * dy + dz * dz).sqrt() * norm;
                if r > 0.0 {
                    let sinc = (std::f64::consts::PI * r).sin() / (std::f64::consts::PI * r);
                    *v = (*v as f64 / (sinc * sinc)) as f32;
                }
            }
        });
    out
}

/// Zero-pad to `PADDING_FACTOR * L`, move the map centre to the origin, and
/// take the real-to-half-complex 3D transform. Output shape `(m, m, m/2+1)`.
fn padded_half_fft(map: &Array3<f32>) -> Array3<Complex32> {
    let l = map.dim().0;
    let m = PADDING_FACTOR * l;
    let half = m / 2 + 1;
    let offset = (m - l) / 2;
    let plan: Arc<dyn Fft<f32>> = FftPlanner::<f32>::new().plan_fft_forward(m);

    // Shifted padded value: origin of the transform sits at the map centre.
    let sample = |z: usize, y: usize, x: usize| -> f32 {
        let pz = (z + m / 2) % m;
        let py = (y + m / 2) % m;
        let px = (x + m / 2) % m;
        if pz < offset || py < offset || px < offset {
            return 0.0;
        }
        let (vz, vy, vx) = (pz - offset, py - offset, px - offset);
        if vz >= l || vy >= l || vx >= l {
            return 0.0;
        }
        map[[vz, vy, vx]]
    };

    let mut ft = Array3::<Complex32>::zeros((m, m, half));

    // x: real rows to half spectra
    ft.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(z, mut plane)| {
            let mut row = vec![Complex32::zero(); m];
            for y in 0..m {
                for (x, slot) in row.iter_mut().enumerate() {
                    *slot = Complex32::new(sample(z, y, x), 0.0);
                }
                plan.process(&mut row);
                for x in 0..half {
                    plane[[y, x]] = row[x];
                }
            }
        });

    // y
    ft.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut plane| {
            let mut lane = vec![Complex32::zero(); m];
            for x in 0..half {
                for y in 0..m {
                    lane[y] = plane[[y, x]];
                }
                plan.process(&mut lane);
                for y in 0..m {
                    plane[[y, x]] = lane[y];
                }
            }
        });

    // z
    ft.axis_iter_mut(Axis(2))
        .into_par_iter()
        .for_each(|mut sheet| {
            let mut lane = vec![Complex32::zero(); m];
            for y in 0..m {
                for z in 0..m {
                    lane[z] = sheet[[z, y]];
                }
                plan.process(&mut lane);
                for z in 0..m {
                    sheet[[z, y]] = lane[z];
                }
            }
        });

    ft
}

/// Re-centre the `z`/`y` axes and drop everything outside radius `rmax`
/// (padded units).
fn centre_and_limit(ft: &Array3<Complex32>, rmax: usize) -> Array3<Complex32> {
    let (m, _, half) = ft.dim();
    let n = m + VOLUME_BORDER;
    let c = (n / 2) as i64;
    let rmax2 = (rmax * rmax) as i64;

    let mut out = Array3::<Complex32>::zeros((n, n, half));
    for z in 0..m {
        let kz = signed_index(z, m);
        for y in 0..m {
            let ky = signed_index(y, m);
            for x in 0..half {
                let kx = x as i64;
                if kz * kz + ky * ky + kx * kx <= rmax2 {
                    out[[(kz + c) as usize, (ky + c) as usize, x]] = ft[[z, y, x]];
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_for_even_map() {
        let map = Array3::<f32>::zeros((8, 8, 8));
        let vol = FourierVolume::from_real_space(&map, 1).unwrap();
        assert_eq!(vol.data().dim(), (19, 19, 9));
        assert_eq!(vol.image_size(), 8);
        assert_eq!(vol.centre(), 9);
    }

    #[test]
    fn test_rejects_non_cubic_map() {
        let map = Array3::<f32>::zeros((8, 8, 6));
        assert!(FourierVolume::from_real_space(&map, 1).is_err());
    }

    #[test]
    fn test_from_array_checks_layout() {
        assert!(FourierVolume::from_array(Array3::zeros((19, 19, 9))).is_ok());
        assert!(FourierVolume::from_array(Array3::zeros((19, 19, 10))).is_err());
        assert!(FourierVolume::from_array(Array3::zeros((19, 17, 9))).is_err());
    }

    #[test]
    fn test_zeros_matches_real_space_layout() {
        assert_eq!(FourierVolume::zeros(8).data().dim(), (19, 19, 9));
    }

    #[test]
    fn test_grid_correction_keeps_centre() {
        let mut map = Array3::<f32>::zeros((8, 8, 8));
        map[[4, 4, 4]] = 3.0;
        map[[4, 4, 7]] = 1.0;
        let corrected = grid_correct(&map);
        assert_eq!(corrected[[4, 4, 4]], 3.0);
        assert!(corrected[[4, 4, 7]] > 1.0);
    }
}
