mod common;

use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;

use cryosub_core::error::SubtractError;
use cryosub_core::io::star::StarFile;
use cryosub_core::metadata::{OutputLayout, ParticleTable};

use common::{image_name, particle_star};

fn layout() -> OutputLayout {
    OutputLayout {
        dest_dir: PathBuf::from("Subtract/job010"),
        prefix: String::new(),
        suffix: "_sub".into(),
    }
}

fn names(entries: &[(usize, &str)]) -> Vec<String> {
    entries
        .iter()
        .map(|&(i, stack)| image_name(i, Path::new(stack)))
        .collect()
}

#[test]
fn test_records_join_optics_table() {
    let text = particle_star(&names(&[(1, "Extract/a.mrcs"), (2, "Extract/a.mrcs")]), 1.5);
    let table = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap();
    assert_eq!(table.len(), 2);

    let second = &table.records()[1];
    assert_eq!(second.source.index, 2);
    assert_eq!(second.source.stack, PathBuf::from("Extract/a.mrcs"));
    assert_abs_diff_eq!(second.ctf.voltage, 300.0);
    assert_abs_diff_eq!(second.ctf.spherical_aberration, 2.7);
    assert_abs_diff_eq!(second.ctf.defocus_u, 15100.0);
    assert_abs_diff_eq!(second.euler.psi, 5.0);
    assert_abs_diff_eq!(second.pixel_size, 1.5);
    // Å origins are converted to pixels.
    assert_abs_diff_eq!(second.origin.x, 1.0);
    assert_abs_diff_eq!(second.origin.y, -2.0);
}

#[test]
fn test_destinations_are_dense_per_stack() {
    let input = names(&[
        (3, "Extract/b.mrcs"),
        (2, "Extract/a.mrcs"),
        (1, "Extract/b.mrcs"),
        (1, "Extract/a.mrcs"),
        (2, "Extract/b.mrcs"),
    ]);
    let text = particle_star(&input, 1.0);
    let table = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap();

    let dest: Vec<(String, usize)> = table
        .records()
        .iter()
        .map(|r| (r.destination.stack.display().to_string(), r.destination.index))
        .collect();
    assert_eq!(
        dest,
        vec![
            ("Subtract/job010/b_sub.mrcs".to_string(), 2),
            ("Subtract/job010/a_sub.mrcs".to_string(), 1),
            ("Subtract/job010/b_sub.mrcs".to_string(), 0),
            ("Subtract/job010/a_sub.mrcs".to_string(), 0),
            ("Subtract/job010/b_sub.mrcs".to_string(), 1),
        ]
    );

    let groups = table.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].path, PathBuf::from("Subtract/job010/a_sub.mrcs"));
    let order: Vec<usize> = groups[1].particles.iter().map(|p| p.source.index).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_output_star_renames_images() {
    let input = names(&[(2, "Extract/a.mrcs"), (1, "Extract/a.mrcs")]);
    let text = particle_star(&input, 1.0);
    let table = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap();

    let out = table.output_star().unwrap();
    assert_eq!(out.blocks.len(), 2);
    let particles = out.block("particles").unwrap();
    assert_eq!(particles.value(0, "rlnImageName"), Some("000001@Subtract/job010/a_sub.mrcs"));
    assert_eq!(particles.value(1, "rlnImageName"), Some("000000@Subtract/job010/a_sub.mrcs"));
    assert_eq!(particles.value(0, "rlnOriginalImageName"), Some(input[0].as_str()));
    assert_eq!(particles.value(1, "rlnOriginalImageName"), Some(input[1].as_str()));
    // Other columns are untouched.
    assert_eq!(particles.value(1, "rlnDefocusV"), Some("14600"));
}

#[test]
fn test_missing_defocus_fails_before_any_work() {
    let text = particle_star(&names(&[(1, "a.mrcs")]), 1.0).replace("_rlnDefocusU #2", "_rlnSomethingElse #2");
    let err = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap_err();
    match err {
        SubtractError::MissingColumn { column, .. } => assert_eq!(column, "rlnDefocusU"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_bad_number_reports_row() {
    let input = names(&[(1, "a.mrcs"), (2, "a.mrcs")]);
    let text = particle_star(&input, 1.0).replace(" 14600 ", " abc ");
    let err = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap_err();
    match err {
        SubtractError::InvalidField { row, column, value } => {
            assert_eq!(row, 1);
            assert_eq!(column, "rlnDefocusV");
            assert_eq!(value, "abc");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_malformed_image_name() {
    let text = particle_star(&["not-an-image".to_string()], 1.0);
    let err = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap_err();
    assert!(matches!(err, SubtractError::InvalidImageName { row: 0, .. }));
}

#[test]
fn test_pixel_size_override() {
    let text = particle_star(&names(&[(1, "a.mrcs")]), 1.0);
    let table =
        ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), Some(2.0)).unwrap();
    let record = &table.records()[0];
    assert_abs_diff_eq!(record.pixel_size, 2.0);
    assert_abs_diff_eq!(record.origin.x, 0.75);
    assert!(ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), Some(-1.0)).is_err());
}

#[test]
fn test_legacy_relion_30_columns() {
    let text = "data_\nloop_\n_rlnImageName #1\n_rlnDefocusU #2\n_rlnDefocusV #3\n\
_rlnDefocusAngle #4\n_rlnPhaseShift #5\n_rlnVoltage #6\n_rlnAmplitudeContrast #7\n\
_rlnSphericalAberration #8\n_rlnAngleRot #9\n_rlnAngleTilt #10\n_rlnAnglePsi #11\n\
_rlnOriginX #12\n_rlnOriginY #13\n_rlnDetectorPixelSize #14\n_rlnMagnification #15\n\
000004@stack.mrcs 10000 11000 5 0 200 0.07 2.0 1 2 3 0.5 -0.5 5.0 50000\n";
    let table = ParticleTable::from_star(StarFile::parse(text).unwrap(), &layout(), None).unwrap();
    let record = &table.records()[0];
    assert_abs_diff_eq!(record.pixel_size, 1.0);
    assert_abs_diff_eq!(record.origin.x, 0.5);
    assert_abs_diff_eq!(record.ctf.voltage, 200.0);
    assert_eq!(record.destination.stack, PathBuf::from("Subtract/job010/stack_sub.mrcs"));
}

#[test]
fn test_output_may_not_overwrite_input() {
    let text = particle_star(&names(&[(1, "Subtract/job010/a.mrcs")]), 1.0);
    let same = OutputLayout {
        dest_dir: PathBuf::from("Subtract/job010"),
        prefix: String::new(),
        suffix: String::new(),
    };
    assert!(ParticleTable::from_star(StarFile::parse(&text).unwrap(), &same, None).is_err());
}

#[test]
fn test_missing_origin_is_reported() {
    let text = particle_star(&names(&[(1, "a.mrcs")]), 1.0)
        .replace("_rlnOriginXAngst", "_rlnOtherX");
    let err = ParticleTable::from_star(StarFile::parse(&text).unwrap(), &layout(), None).unwrap_err();
    assert!(matches!(err, SubtractError::MissingColumn { .. }));
}
