use ndarray::{Array2, Zip};
use num_complex::Complex64;

use crate::consts::EPSILON;
use crate::error::{Result, SubtractError};

/// Per-bin normalized cross-correlation between two half spectra.
///
/// For every radial bin `b`, returns
/// `|Σ p1·conj(p2)| / sqrt(Σ|p1|² · Σ|p2|²)` over the pixels whose `bins`
/// entry is `b`. Bins without signal (no pixels, or zero power in either
/// input) are 0, so every coefficient is in `[0, 1]`.
pub fn bin_correlation(
    p1: &Array2<Complex64>,
    p2: &Array2<Complex64>,
    bins: &Array2<usize>,
    nbins: usize,
) -> Result<Vec<f64>> {
    if p1.dim() != p2.dim() {
        return Err(SubtractError::ShapeMismatch {
            expected: p1.dim(),
            actual: p2.dim(),
        });
    }
    if p1.dim() != bins.dim() {
        return Err(SubtractError::ShapeMismatch {
            expected: bins.dim(),
            actual: p1.dim(),
        });
    }

    let mut cross = vec![Complex64::new(0.0, 0.0); nbins];
    let mut power1 = vec![0.0f64; nbins];
    let mut power2 = vec![0.0f64; nbins];
    let mut out_of_range = None;

    Zip::from(p1).and(p2).and(bins).for_each(|&a, &b, &bin| {
        if bin >= nbins {
            out_of_range = Some(bin);
            return;
        }
        cross[bin] += a * b.conj();
        power1[bin] += a.norm_sqr();
        power2[bin] += b.norm_sqr();
    });
    if let Some(bin) = out_of_range {
        return Err(SubtractError::Pipeline(format!(
            "Radial bin {} outside table of {} bins",
            bin, nbins
        )));
    }

    Ok(cross
        .iter()
        .zip(power1.iter().zip(power2.iter()))
        .map(|(c, (&e1, &e2))| {
            let denom = (e1 * e2).sqrt();
            if denom > EPSILON {
                c.norm() / denom
            } else {
                0.0
            }
        })
        .collect())
}

/// Look up each pixel's coefficient by its radial bin.
pub fn broadcast(table: &[f64], bins: &Array2<usize>) -> Array2<f64> {
    bins.mapv(|b| table.get(b).copied().unwrap_or(0.0))
}
