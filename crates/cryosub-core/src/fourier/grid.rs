use ndarray::Array2;

/// Signed DFT frequency index for position `i` of an `n`-point transform
/// (numpy `fftfreq` ordering, multiplied by `n`).
pub fn signed_index(i: usize, n: usize) -> i64 {
    if i < n.div_ceil(2) {
        i as i64
    } else {
        i as i64 - n as i64
    }
}

/// Per-pixel spatial frequencies of a half spectrum of an `n`×`n` image.
///
/// All arrays have shape `(n, n / 2 + 1)` and are indexed like
/// [`Spectrum`](super::fft::Spectrum): rows follow `fftfreq(n)` (y),
/// columns follow `rfftfreq(n)` (x). Frequencies are in cycles per pixel.
#[derive(Clone, Debug)]
pub struct FrequencyGrid {
    pub size: usize,
    pub sx: Array2<f64>,
    pub sy: Array2<f64>,
    /// Frequency magnitude `sqrt(sx² + sy²)`.
    pub s: Array2<f64>,
    /// Frequency angle `atan2(sy, sx)` in radians.
    pub a: Array2<f64>,
    /// Radial bin per pixel; everything beyond Nyquist shares bin `n/2 + 1`.
    pub r: Array2<usize>,
    /// Number of radial bins (`max(r) + 1`).
    pub nr: usize,
}

impl FrequencyGrid {
    pub fn new(size: usize) -> Self {
        let n = size;
        let half = n / 2 + 1;
        let nyquist_bin = n / 2;
        let inv = 1.0 / n as f64;

        let sx = Array2::from_shape_fn((n, half), |(_, col)| col as f64 * inv);
        let sy = Array2::from_shape_fn((n, half), |(row, _)| signed_index(row, n) as f64 * inv);
        let s = Array2::from_shape_fn((n, half), |idx| sx[idx].hypot(sy[idx]));
        let a = Array2::from_shape_fn((n, half), |idx| sy[idx].atan2(sx[idx]));
        let r = s.mapv(|v| {
            let bin = (v * n as f64).round() as usize;
            if bin > nyquist_bin {
                nyquist_bin + 1
            } else {
                bin
            }
        });
        let nr = r.iter().copied().max().unwrap_or(0) + 1;

        Self {
            size,
            sx,
            sy,
            s,
            a,
            r,
            nr,
        }
    }

    /// Shape of every grid array, which is also the spectrum shape.
    pub fn shape(&self) -> (usize, usize) {
        self.s.dim()
    }
}
