use approx::assert_abs_diff_eq;

use cryosub_core::ctf::{ctf_grid, electron_wavelength, eval_ctf, CtfEnvelope};
use cryosub_core::fourier::FrequencyGrid;
use cryosub_core::particle::CtfParams;

#[test]
fn test_wavelength_decreases_with_voltage() {
    assert_abs_diff_eq!(electron_wavelength(200.0), 0.025079, epsilon = 1e-5);
    assert!(electron_wavelength(300.0) < electron_wavelength(200.0));
}

#[test]
fn test_ctf_bounded_by_one() {
    let params = CtfParams::default();
    let envelope = CtfEnvelope::default();
    for i in 0..200 {
        let s = i as f64 * 0.0025;
        let v = eval_ctf(s, 0.7, &params, &envelope);
        assert!(v.abs() <= 1.0 + 1e-12);
    }
}

#[test]
fn test_astigmatism_follows_angle() {
    let params = CtfParams {
        defocus_u: 20_000.0,
        defocus_v: 10_000.0,
        defocus_angle: 30.0,
        ..Default::default()
    };
    let envelope = CtfEnvelope::default();
    let angle = 30f64.to_radians();
    let round = CtfParams {
        defocus_u: 20_000.0,
        defocus_v: 20_000.0,
        ..Default::default()
    };
    // Along the astigmatism angle the defocus equals defocus_u.
    for s in [0.01, 0.05, 0.1] {
        assert_abs_diff_eq!(
            eval_ctf(s, angle, &params, &envelope),
            eval_ctf(s, 0.0, &round, &envelope),
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_phase_shift_of_ninety_degrees() {
    let params = CtfParams {
        phase_shift: 90.0,
        ..Default::default()
    };
    let v = eval_ctf(0.0, 0.0, &params, &CtfEnvelope::default());
    let k3 = (1.0 - params.amplitude_contrast.powi(2)).sqrt();
    assert_abs_diff_eq!(v, k3, epsilon = 1e-12);
}

#[test]
fn test_b_factor_damps_high_frequencies() {
    let params = CtfParams::default();
    let plain = CtfEnvelope::default();
    let damped = CtfEnvelope {
        b_factor: 100.0,
        low_pass: 0.0,
    };
    let s = 0.2;
    let ratio = eval_ctf(s, 0.0, &params, &damped) / eval_ctf(s, 0.0, &params, &plain);
    assert_abs_diff_eq!(ratio, (-25.0 * s * s).exp(), epsilon = 1e-9);
}

#[test]
fn test_low_pass_evaluates_as_zero_frequency() {
    let params = CtfParams::default();
    let envelope = CtfEnvelope::nyquist(2.0);
    let beyond = eval_ctf(0.3, 0.0, &params, &envelope);
    assert_abs_diff_eq!(beyond, params.amplitude_contrast, epsilon = 1e-12);
}

#[test]
fn test_grid_uses_pixel_size() {
    let grid = FrequencyGrid::new(32);
    let params = CtfParams::default();
    let envelope = CtfEnvelope::default();
    let apix = 1.3;
    let values = ctf_grid(&grid.s, &grid.a, apix, &params, &envelope);
    assert_eq!(values.dim(), grid.shape());
    let (row, col) = (5, 7);
    let expected = eval_ctf(grid.s[[row, col]] / apix, grid.a[[row, col]], &params, &envelope);
    assert_abs_diff_eq!(values[[row, col]], expected, epsilon = 1e-12);
    assert_abs_diff_eq!(values[[0, 0]], params.amplitude_contrast, epsilon = 1e-12);
}
