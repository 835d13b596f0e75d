mod common;

use std::io::Write;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use tempfile::NamedTempFile;

use cryosub_core::error::SubtractError;
use cryosub_core::io::mrc::{read_volume, MrcMode, MrcReader, MRC_HEADER_SIZE};
use cryosub_core::io::mrc_writer::{write_stack, write_volume, MrcStackWriter};

use common::pattern_image;

/// Minimal MRC header: dimensions, mode, sampling, cell and machine stamp.
fn build_header(nx: i32, ny: i32, nz: i32, mode: i32, cell_x: f32, big_endian: bool) -> Vec<u8> {
    let mut buf = vec![0u8; MRC_HEADER_SIZE];
    let put_i32 = |buf: &mut Vec<u8>, at: usize, v: i32| {
        let bytes = if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        buf[at..at + 4].copy_from_slice(&bytes);
    };
    put_i32(&mut buf, 0, nx);
    put_i32(&mut buf, 4, ny);
    put_i32(&mut buf, 8, nz);
    put_i32(&mut buf, 12, mode);
    put_i32(&mut buf, 28, nx);
    put_i32(&mut buf, 32, ny);
    put_i32(&mut buf, 36, nz);
    let cell = if big_endian { cell_x.to_be_bytes() } else { cell_x.to_le_bytes() };
    buf[40..44].copy_from_slice(&cell);
    buf[208..212].copy_from_slice(b"MAP ");
    let stamp = if big_endian { 0x11 } else { 0x44 };
    buf[212] = stamp;
    buf[213] = stamp;
    buf
}

#[test]
fn test_stack_write_then_read() {
    let file = NamedTempFile::new().unwrap();
    let images: Vec<Array2<f32>> = (0..3).map(|i| pattern_image(12, i as f32)).collect();
    write_stack(file.path(), &images, 1.25).unwrap();

    let reader = MrcReader::open(file.path()).unwrap();
    assert_eq!(reader.section_count(), 3);
    assert_eq!(reader.header.mode, MrcMode::Float32);
    assert_abs_diff_eq!(reader.header.pixel_size(), 1.25, epsilon = 1e-6);
    for (i, expected) in images.iter().enumerate() {
        assert_eq!(&reader.read_section(i).unwrap(), expected);
    }
    assert!(reader.read_section(3).is_err());
}

#[test]
fn test_append_updates_header_statistics() {
    let file = NamedTempFile::new().unwrap();
    let mut writer = MrcStackWriter::create(file.path(), 2, 2, 1.0).unwrap();
    writer
        .append(&Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 2.0, 3.0]).unwrap())
        .unwrap();
    writer.append(&Array2::from_elem((2, 2), -1.0)).unwrap();
    assert_eq!(writer.sections(), 2);
    assert!(writer.append(&Array2::zeros((3, 2))).is_err());
    writer.finish().unwrap();

    let reader = MrcReader::open(file.path()).unwrap();
    assert_eq!(reader.section_count(), 2);
    assert_abs_diff_eq!(reader.header.dmin, -1.0);
    assert_abs_diff_eq!(reader.header.dmax, 3.0);
    assert_abs_diff_eq!(reader.header.dmean, 0.25);
}

#[test]
fn test_volume_round_trip() {
    let file = NamedTempFile::new().unwrap();
    let volume = Array3::from_shape_fn((4, 5, 6), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
    write_volume(file.path(), &volume, 2.0).unwrap();

    let (back, pixel_size) = read_volume(file.path()).unwrap();
    assert_eq!(back, volume);
    assert_abs_diff_eq!(pixel_size, 2.0, epsilon = 1e-6);
    let reader = MrcReader::open(file.path()).unwrap();
    assert_eq!(reader.header.ispg, 1);
}

#[test]
fn test_int16_stack() {
    let mut file = NamedTempFile::new().unwrap();
    let mut bytes = build_header(2, 2, 2, 1, 3.0, false);
    for v in [1i16, -2, 3, -4, 5, 6, 7, 8] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let reader = MrcReader::open(file.path()).unwrap();
    assert_eq!(reader.header.mode, MrcMode::Int16);
    assert_abs_diff_eq!(reader.header.pixel_size(), 1.5, epsilon = 1e-6);
    let second = reader.read_section(1).unwrap();
    assert_eq!(second, Array2::from_shape_vec((2, 2), vec![5.0, 6.0, 7.0, 8.0]).unwrap());
}

#[test]
fn test_big_endian_float_map() {
    let mut file = NamedTempFile::new().unwrap();
    let mut bytes = build_header(2, 1, 1, 2, 2.0, true);
    for v in [1.5f32, -0.25] {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let reader = MrcReader::open(file.path()).unwrap();
    assert!(!reader.header.little_endian);
    let section = reader.read_section(0).unwrap();
    assert_eq!(section[[0, 0]], 1.5);
    assert_eq!(section[[0, 1]], -0.25);
}

#[test]
fn test_extended_header_is_skipped() {
    let mut file = NamedTempFile::new().unwrap();
    let mut bytes = build_header(1, 1, 1, 2, 1.0, false);
    bytes[92..96].copy_from_slice(&8i32.to_le_bytes());
    bytes.extend_from_slice(&[0xFFu8; 8]);
    bytes.extend_from_slice(&4.0f32.to_le_bytes());
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let reader = MrcReader::open(file.path()).unwrap();
    assert_eq!(reader.header.nsymbt, 8);
    assert_eq!(reader.read_section(0).unwrap()[[0, 0]], 4.0);
}

#[test]
fn test_truncated_file_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    let mut bytes = build_header(4, 4, 2, 2, 4.0, false);
    bytes.extend_from_slice(&[0u8; 16]);
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    assert!(MrcReader::open(file.path()).is_err());

    let mut short = NamedTempFile::new().unwrap();
    short.write_all(&[0u8; 100]).unwrap();
    short.flush().unwrap();
    assert!(MrcReader::open(short.path()).is_err());
}

#[test]
fn test_unsupported_mode_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    let mut bytes = build_header(1, 1, 1, 4, 1.0, false);
    bytes.extend_from_slice(&[0u8; 8]);
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    assert!(MrcReader::open(file.path()).is_err());
}

#[test]
fn test_oversized_dimensions_are_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    let bytes = build_header(i32::MAX, i32::MAX, i32::MAX, 2, 1.0, false);
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();
    match MrcReader::open(file.path()) {
        Err(SubtractError::InvalidMrc(msg)) => assert!(msg.contains("exceed")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("header with overflowing size was accepted"),
    }
    assert!(read_volume(file.path()).is_err());
}
