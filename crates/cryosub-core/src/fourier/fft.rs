use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SubtractError};

/// Half-spectrum of a real image: shape `(ny, nx / 2 + 1)`, rows ordered as
/// `fftfreq(ny)`, columns as `rfftfreq(nx)`.
pub type Spectrum = Array2<Complex64>;

/// Cached 2D transform plans for one image size.
///
/// Forward transforms treat the image centre `(ny / 2, nx / 2)` as the
/// origin, and inverse transforms put the origin back there, so
/// `inverse(forward(img)) == img`.
#[derive(Clone)]
pub struct ImageTransform {
    ny: usize,
    nx: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl ImageTransform {
    pub fn new(ny: usize, nx: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            ny,
            nx,
            row_forward: planner.plan_fft_forward(nx),
            row_inverse: planner.plan_fft_inverse(nx),
            col_forward: planner.plan_fft_forward(ny),
            col_inverse: planner.plan_fft_inverse(ny),
        }
    }

    pub fn image_shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    pub fn spectrum_shape(&self) -> (usize, usize) {
        (self.ny, self.nx / 2 + 1)
    }

    /// Real image -> half spectrum (unnormalized).
    pub fn forward(&self, image: &Array2<f32>) -> Result<Spectrum> {
        let (ny, nx) = (self.ny, self.nx);
        if image.dim() != (ny, nx) {
            return Err(SubtractError::ShapeMismatch {
                expected: (ny, nx),
                actual: image.dim(),
            });
        }
        let half = nx / 2 + 1;
        let mut spectrum = Spectrum::zeros((ny, half));

        // Rows: ifftshift while loading, then full complex FFT, keep the
        // non-negative frequencies.
        let mut row = vec![Complex64::zero(); nx];
        for r in 0..ny {
            let src_r = (r + ny / 2) % ny;
            for (c, slot) in row.iter_mut().enumerate() {
                let src_c = (c + nx / 2) % nx;
                *slot = Complex64::new(image[[src_r, src_c]] as f64, 0.0);
            }
            self.row_forward.process(&mut row);
            for c in 0..half {
                spectrum[[r, c]] = row[c];
            }
        }

        let mut col = vec![Complex64::zero(); ny];
        for c in 0..half {
            for r in 0..ny {
                col[r] = spectrum[[r, c]];
            }
            self.col_forward.process(&mut col);
            for r in 0..ny {
                spectrum[[r, c]] = col[r];
            }
        }

        Ok(spectrum)
    }

    /// Half spectrum -> real image, normalized so that it inverts `forward`.
    pub fn inverse(&self, spectrum: &Spectrum) -> Result<Array2<f32>> {
        let (ny, nx) = (self.ny, self.nx);
        let half = nx / 2 + 1;
        if spectrum.dim() != (ny, half) {
            return Err(SubtractError::ShapeMismatch {
                expected: (ny, half),
                actual: spectrum.dim(),
            });
        }

        let mut work = spectrum.clone();
        let mut col = vec![Complex64::zero(); ny];
        for c in 0..half {
            for r in 0..ny {
                col[r] = work[[r, c]];
            }
            self.col_inverse.process(&mut col);
            for r in 0..ny {
                work[[r, c]] = col[r];
            }
        }

        let scale = 1.0 / (ny * nx) as f64;
        let mut image = Array2::<f32>::zeros((ny, nx));
        let mut row = vec![Complex64::zero(); nx];
        for r in 0..ny {
            // Rebuild the negative x-frequencies from Hermitian symmetry.
            for (c, slot) in row.iter_mut().enumerate() {
                *slot = if c < half {
                    work[[r, c]]
                } else {
                    work[[r, nx - c]].conj()
                };
            }
            self.row_inverse.process(&mut row);
            let dst_r = (r + ny / 2) % ny;
            for (c, value) in row.iter().enumerate() {
                let dst_c = (c + nx / 2) % nx;
                image[[dst_r, dst_c]] = (value.re * scale) as f32;
            }
        }

        Ok(image)
    }
}

/// One-shot forward transform of a centred real image.
pub fn rfft2_centered(image: &Array2<f32>) -> Result<Spectrum> {
    let (ny, nx) = image.dim();
    ImageTransform::new(ny, nx).forward(image)
}

/// One-shot inverse transform back to a centred real image of width `nx`.
pub fn irfft2_centered(spectrum: &Spectrum, nx: usize) -> Result<Array2<f32>> {
    let ny = spectrum.nrows();
    ImageTransform::new(ny, nx).inverse(spectrum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_pixel_has_flat_spectrum() {
        let mut image = Array2::<f32>::zeros((8, 8));
        image[[4, 4]] = 2.0;
        let spectrum = rfft2_centered(&image).unwrap();
        assert_eq!(spectrum.dim(), (8, 5));
        for v in spectrum.iter() {
            assert!((v.re - 2.0).abs() < 1e-12);
            assert!(v.im.abs() < 1e-12);
        }
    }

    #[test]
    fn test_inverse_rejects_wrong_shape() {
        let transform = ImageTransform::new(8, 8);
        let wrong = Spectrum::zeros((8, 8));
        assert!(transform.inverse(&wrong).is_err());
    }
}
