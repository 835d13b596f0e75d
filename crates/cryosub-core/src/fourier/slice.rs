use ndarray::Axis;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::consts::PADDING_FACTOR;
use crate::geometry::{apply, transpose, Rotation};

use super::fft::Spectrum;
use super::grid::signed_index;
use super::volume::FourierVolume;

/// Extract the central section of `volume` perpendicular to the viewing
/// direction given by `rotation` (volume -> image frame).
///
/// The result is a half spectrum of box size `volume.image_size()`. Pixels
/// beyond the Nyquist circle are zero.
pub fn interpolate_slice(volume: &FourierVolume, rotation: &Rotation) -> Spectrum {
    let n = volume.image_size();
    let half = n / 2 + 1;
    let rmax = (n / 2) as i64;
    let rmax2 = rmax * rmax;
    let to_volume = transpose(rotation);
    let scale = PADDING_FACTOR as f64;

    let mut out = Spectrum::zeros((n, half));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut line)| {
            let yi = signed_index(row, n);
            for (col, value) in line.iter_mut().enumerate() {
                let xi = col as i64;
                if xi * xi + yi * yi > rmax2 {
                    continue;
                }
                let p = apply(&to_volume, [xi as f64 * scale, yi as f64 * scale, 0.0]);
                *value = sample_hermitian(volume, p[2], p[1], p[0]);
            }
        });
    out
}

/// Trilinear sample at padded-grid coordinates, using the conjugate of the
/// mirrored point when `x` falls in the unstored half-space.
pub fn sample_hermitian(volume: &FourierVolume, z: f64, y: f64, x: f64) -> Complex64 {
    if x < 0.0 {
        trilinear(volume, -z, -y, -x).conj()
    } else {
        trilinear(volume, z, y, x)
    }
}

fn trilinear(volume: &FourierVolume, z: f64, y: f64, x: f64) -> Complex64 {
    let (z0, y0, x0) = (z.floor(), y.floor(), x.floor());
    let (fz, fy, fx) = (z - z0, y - y0, x - x0);
    let (z0, y0, x0) = (z0 as i64, y0 as i64, x0 as i64);

    let at = |dz: i64, dy: i64, dx: i64| -> Complex64 {
        let v = volume.at(z0 + dz, y0 + dy, x0 + dx);
        Complex64::new(v.re as f64, v.im as f64)
    };
    let lerp = |a: Complex64, b: Complex64, t: f64| a + (b - a) * t;

    let c00 = lerp(at(0, 0, 0), at(0, 0, 1), fx);
    let c01 = lerp(at(0, 1, 0), at(0, 1, 1), fx);
    let c10 = lerp(at(1, 0, 0), at(1, 0, 1), fx);
    let c11 = lerp(at(1, 1, 0), at(1, 1, 1), fx);
    let c0 = lerp(c00, c01, fy);
    let c1 = lerp(c10, c11, fy);
    lerp(c0, c1, fz)
}
