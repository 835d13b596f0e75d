use ndarray::{Array2, Array3, Axis};

use cryosub_core::fourier::grid::signed_index;
use cryosub_core::fourier::volume::grid_correct;
use cryosub_core::fourier::{interpolate_slice, rfft2_centered, FourierVolume};
use cryosub_core::geometry::{euler_to_rotation, IDENTITY};
use cryosub_core::particle::EulerAngles;

const L: usize = 16;

fn blob_map(n: usize) -> Array3<f32> {
    let c = (n / 2) as f32;
    Array3::from_shape_fn((n, n, n), |(z, y, x)| {
        let (dz, dy, dx) = (z as f32 - c, y as f32 - c - 1.0, x as f32 - c + 2.0);
        (-(dx * dx + 0.5 * dy * dy + 2.0 * dz * dz) / 8.0).exp()
            + 0.5 * (-((dx - 3.0).powi(2) + dy * dy + dz * dz) / 4.0).exp()
    })
}

fn delta_map(n: usize) -> Array3<f32> {
    let mut map = Array3::<f32>::zeros((n, n, n));
    map[[n / 2, n / 2, n / 2]] = 1.0;
    map
}

#[test]
fn test_zero_volume_gives_zero_slice() {
    let vol = FourierVolume::zeros(L);
    let slice = interpolate_slice(&vol, &euler_to_rotation(0.3, 1.1, -0.4));
    assert_eq!(slice.dim(), (L, L / 2 + 1));
    assert!(slice.iter().all(|v| v.norm() == 0.0));
}

#[test]
fn test_delta_map_gives_flat_slice() {
    let vol = FourierVolume::from_real_space(&delta_map(L), 2).unwrap();
    let inner = (L / 2 - 2) as i64;
    for angles in [
        EulerAngles { rot: 0.0, tilt: 0.0, psi: 0.0 },
        EulerAngles { rot: 33.0, tilt: 71.0, psi: -120.0 },
        EulerAngles { rot: -150.0, tilt: 140.0, psi: 15.0 },
    ] {
        let slice = interpolate_slice(&vol, &angles.rotation());
        for ((row, col), v) in slice.indexed_iter() {
            let (yi, xi) = (signed_index(row, L), col as i64);
            if xi * xi + yi * yi <= inner * inner {
                assert!((v.re - 1.0).abs() < 1e-4, "{:?} at ({}, {})", v, row, col);
                assert!(v.im.abs() < 1e-4);
            }
        }
    }
}

#[test]
fn test_pixels_beyond_nyquist_are_zero() {
    let vol = FourierVolume::from_real_space(&blob_map(L), 2).unwrap();
    let slice = interpolate_slice(&vol, &euler_to_rotation(0.2, 0.9, 1.4));
    let rmax = (L / 2) as i64;
    for ((row, col), v) in slice.indexed_iter() {
        let (yi, xi) = (signed_index(row, L), col as i64);
        if xi * xi + yi * yi > rmax * rmax {
            assert_eq!(v.norm(), 0.0);
        }
    }
}

#[test]
fn test_identity_slice_is_transform_of_projection() {
    let map = blob_map(L);
    let vol = FourierVolume::from_real_space(&map, 2).unwrap();
    let slice = interpolate_slice(&vol, &IDENTITY);

    let projection = grid_correct(&map).sum_axis(Axis(0));
    let expected = rfft2_centered(&projection).unwrap();
    let scale = expected.iter().map(|v| v.norm()).fold(0.0, f64::max);

    let rmax = (L / 2) as i64;
    for ((row, col), v) in slice.indexed_iter() {
        let (yi, xi) = (signed_index(row, L), col as i64);
        if xi * xi + yi * yi <= rmax * rmax {
            let diff = (v - expected[[row, col]]).norm();
            assert!(diff < 1e-4 * scale, "mismatch {} at ({}, {})", diff, row, col);
        }
    }
}

#[test]
fn test_quarter_turn_slice_is_transform_of_rotated_projection() {
    let map = blob_map(L);
    let vol = FourierVolume::from_real_space(&map, 2).unwrap();
    let angles = EulerAngles { rot: 90.0, tilt: 0.0, psi: 0.0 };
    let slice = interpolate_slice(&vol, &angles.rotation());

    // A quarter turn about z maps image pixel (x, y) to projection pixel
    // (-y, x) around the centre: I[c + y, c + x] = P[c + x, c - y].
    let projection = grid_correct(&map).sum_axis(Axis(0));
    let c = L / 2;
    let rotated = Array2::from_shape_fn((L, L), |(row, col)| {
        projection[[col, (2 * c + L - row) % L]]
    });
    let expected = rfft2_centered(&rotated).unwrap();
    let scale = expected.iter().map(|v| v.norm()).fold(0.0, f64::max);

    let rmax = (L / 2) as i64;
    for ((row, col), v) in slice.indexed_iter() {
        let (yi, xi) = (signed_index(row, L), col as i64);
        if xi * xi + yi * yi <= rmax * rmax {
            let diff = (v - expected[[row, col]]).norm();
            assert!(diff < 1e-3 * scale, "mismatch {} at ({}, {})", diff, row, col);
        }
    }

    // The unrotated projection is a different image.
    let unrotated = rfft2_centered(&projection).unwrap();
    let worst = slice
        .iter()
        .zip(unrotated.iter())
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
    assert!(worst > 1e-2 * scale);
}

#[test]
fn test_slice_of_real_map_is_hermitian_on_first_column() {
    let vol = FourierVolume::from_real_space(&blob_map(L), 2).unwrap();
    let slice = interpolate_slice(&vol, &euler_to_rotation(0.4, 1.2, 0.7));
    let scale = slice.iter().map(|v| v.norm()).fold(0.0, f64::max);
    for row in 1..L / 2 {
        let a = slice[[row, 0]];
        let b = slice[[L - row, 0]];
        assert!((a - b.conj()).norm() < 1e-4 * scale, "row {}", row);
    }
}
