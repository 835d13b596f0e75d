use ndarray::{Array2, Zip};

use crate::consts::{MM_TO_ANGSTROM, WAVELENGTH_NUMERATOR, WAVELENGTH_RELATIVISTIC};
use crate::particle::CtfParams;

/// Envelope terms applied on top of the oscillating CTF.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CtfEnvelope {
    /// B-factor in Å², RELION sign convention (`exp(-B/4 · s²)`).
    pub b_factor: f64,
    /// Resolution in Å beyond which frequencies are evaluated as zero.
    /// `0` disables the cutoff.
    pub low_pass: f64,
}

impl CtfEnvelope {
    /// Envelope used for subtraction: no B-factor, cut at Nyquist.
    pub fn nyquist(pixel_size: f64) -> Self {
        Self {
            b_factor: 0.0,
            low_pass: 2.0 * pixel_size,
        }
    }
}

/// Relativistic electron wavelength in Å for an accelerating voltage in kV.
pub fn electron_wavelength(voltage_kv: f64) -> f64 {
    let volts = voltage_kv * 1e3;
    WAVELENGTH_NUMERATOR / (volts * (1.0 + volts * WAVELENGTH_RELATIVISTIC)).sqrt()
}

/// Frequency-independent factors of the CTF for one particle.
#[derive(Clone, Copy, Debug)]
struct CtfTerms {
    defocus_mean: f64,
    defocus_dev: f64,
    astig_angle: f64,
    k1: f64,
    k2: f64,
    k3: f64,
    k4: f64,
    k5: f64,
    amplitude_contrast: f64,
    cutoff: Option<f64>,
}

impl CtfTerms {
    fn new(params: &CtfParams, envelope: &CtfEnvelope) -> Self {
        let lambda = electron_wavelength(params.voltage);
        let cs = params.spherical_aberration * MM_TO_ANGSTROM;
        let ac = params.amplitude_contrast;
        Self {
            defocus_mean: -(params.defocus_u + params.defocus_v) * 0.5,
            defocus_dev: -(params.defocus_u - params.defocus_v) * 0.5,
            astig_angle: params.defocus_angle.to_radians(),
            k1: std::f64::consts::PI * lambda,
            k2: std::f64::consts::FRAC_PI_2 * cs * lambda.powi(3),
            k3: (1.0 - ac * ac).sqrt(),
            k4: envelope.b_factor / 4.0,
            k5: params.phase_shift.to_radians(),
            amplitude_contrast: ac,
            cutoff: (envelope.low_pass != 0.0).then(|| 1.0 / envelope.low_pass),
        }
    }

    #[inline]
    fn eval(&self, s: f64, angle: f64) -> f64 {
        let s = match self.cutoff {
            Some(limit) if s > limit => 0.0,
            _ => s,
        };
        let s2 = s * s;
        let dz = self.defocus_mean + self.defocus_dev * (2.0 * (angle - self.astig_angle)).cos();
        let gamma = self.k1 * dz * s2 + self.k2 * s2 * s2 - self.k5;
        let mut ctf = -(self.k3 * gamma.sin() - self.amplitude_contrast * gamma.cos());
        if self.k4 != 0.0 {
            ctf *= (-self.k4 * s2).exp();
        }
        ctf
    }
}

/// CTF value at spatial frequency `s` (1/Å) and angle `angle` (radians).
pub fn eval_ctf(s: f64, angle: f64, params: &CtfParams, envelope: &CtfEnvelope) -> f64 {
    CtfTerms::new(params, envelope).eval(s, angle)
}

/// CTF over a whole frequency grid. `s` is in cycles per pixel and is
/// converted with `pixel_size` (Å/pixel).
pub fn ctf_grid(
    s: &Array2<f64>,
    a: &Array2<f64>,
    pixel_size: f64,
    params: &CtfParams,
    envelope: &CtfEnvelope,
) -> Array2<f64> {
    let terms = CtfTerms::new(params, envelope);
    let inv_apix = 1.0 / pixel_size;
    let mut out = Array2::<f64>::zeros(s.dim());
    Zip::from(&mut out)
        .and(s)
        .and(a)
        .for_each(|c, &s, &a| *c = terms.eval(s * inv_apix, a));
    out
}
