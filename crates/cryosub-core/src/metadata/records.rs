use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Result, SubtractError};
use crate::io::star::StarBlock;
use crate::particle::{CtfParams, EulerAngles, ImageRef, OriginShift};

pub const COL_IMAGE_NAME: &str = "rlnImageName";
pub const COL_ORIGINAL_IMAGE_NAME: &str = "rlnOriginalImageName";
pub const COL_OPTICS_GROUP: &str = "rlnOpticsGroup";
pub const COL_DEFOCUS_U: &str = "rlnDefocusU";
pub const COL_DEFOCUS_V: &str = "rlnDefocusV";
pub const COL_DEFOCUS_ANGLE: &str = "rlnDefocusAngle";
pub const COL_PHASE_SHIFT: &str = "rlnPhaseShift";
pub const COL_VOLTAGE: &str = "rlnVoltage";
pub const COL_AMPLITUDE_CONTRAST: &str = "rlnAmplitudeContrast";
pub const COL_SPHERICAL_ABERRATION: &str = "rlnSphericalAberration";
pub const COL_ANGLE_ROT: &str = "rlnAngleRot";
pub const COL_ANGLE_TILT: &str = "rlnAngleTilt";
pub const COL_ANGLE_PSI: &str = "rlnAnglePsi";
pub const COL_ORIGIN_X: &str = "rlnOriginX";
pub const COL_ORIGIN_Y: &str = "rlnOriginY";
pub const COL_ORIGIN_X_ANGST: &str = "rlnOriginXAngst";
pub const COL_ORIGIN_Y_ANGST: &str = "rlnOriginYAngst";
pub const COL_IMAGE_PIXEL_SIZE: &str = "rlnImagePixelSize";
pub const COL_DETECTOR_PIXEL_SIZE: &str = "rlnDetectorPixelSize";
pub const COL_MAGNIFICATION: &str = "rlnMagnification";

const REQUIRED_COLUMNS: [&str; 11] = [
    COL_DEFOCUS_U,
    COL_DEFOCUS_V,
    COL_DEFOCUS_ANGLE,
    COL_PHASE_SHIFT,
    COL_VOLTAGE,
    COL_AMPLITUDE_CONTRAST,
    COL_SPHERICAL_ABERRATION,
    COL_ANGLE_ROT,
    COL_ANGLE_TILT,
    COL_ANGLE_PSI,
    COL_IMAGE_NAME,
];

/// One validated particle row before destinations are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleRow {
    pub row: usize,
    /// `rlnImageName` exactly as written in the input.
    pub image_name: String,
    pub source: ImageRef,
    pub ctf: CtfParams,
    pub euler: EulerAngles,
    pub origin: OriginShift,
    pub pixel_size: f64,
}

/// How the pixel size is obtained.
#[derive(Clone, Copy, Debug, PartialEq)]
enum PixelSizeSource {
    Fixed(f64),
    ImagePixelSize,
    Detector,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OriginUnits {
    Pixels,
    Angstrom,
}

/// Column lookup on the particle table with fall-back to the optics table
/// through `rlnOpticsGroup`.
struct FieldSource<'a> {
    particles: &'a StarBlock,
    optics: Option<&'a StarBlock>,
    optics_rows: HashMap<&'a str, usize>,
}

impl<'a> FieldSource<'a> {
    fn new(particles: &'a StarBlock, optics: Option<&'a StarBlock>) -> Self {
        let mut optics_rows = HashMap::new();
        if let Some(table) = optics {
            if let Some(col) = table.column_index(COL_OPTICS_GROUP) {
                for (i, row) in table.rows.iter().enumerate() {
                    optics_rows.insert(row[col].as_str(), i);
                }
            }
        }
        Self {
            particles,
            optics,
            optics_rows,
        }
    }

    fn available(&self, column: &str) -> bool {
        if self.particles.has_column(column) {
            return true;
        }
        match self.optics {
            Some(table) => {
                table.has_column(column) && self.particles.has_column(COL_OPTICS_GROUP)
            }
            None => false,
        }
    }

    fn require(&self, column: &str) -> Result<()> {
        if self.available(column) {
            Ok(())
        } else {
            Err(SubtractError::MissingColumn {
                block: self.particles.name.clone(),
                column: column.to_string(),
            })
        }
    }

    fn text(&self, row: usize, column: &str) -> Result<&'a str> {
        if let Some(value) = self.particles.value(row, column) {
            return Ok(value);
        }
        let missing = || SubtractError::MissingColumn {
            block: self.particles.name.clone(),
            column: column.to_string(),
        };
        let table = self.optics.ok_or_else(missing)?;
        let group = self.particles.value(row, COL_OPTICS_GROUP).ok_or_else(missing)?;
        let optics_row = *self.optics_rows.get(group).ok_or_else(|| SubtractError::InvalidField {
            row,
            column: COL_OPTICS_GROUP.to_string(),
            value: group.to_string(),
        })?;
        table.value(optics_row, column).ok_or_else(missing)
    }

    fn number(&self, row: usize, column: &str) -> Result<f64> {
        let text = self.text(row, column)?;
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(SubtractError::InvalidField {
                row,
                column: column.to_string(),
                value: text.to_string(),
            }),
        }
    }
}

/// Split `"<index>@<stack>"` into a 1-based index and a stack path.
pub fn parse_image_name(row: usize, value: &str) -> Result<ImageRef> {
    let invalid = || SubtractError::InvalidImageName {
        row,
        value: value.to_string(),
    };
    let (index, stack) = value.split_once('@').ok_or_else(invalid)?;
    let index: usize = index.trim().parse().map_err(|_| invalid())?;
    if index == 0 || stack.is_empty() {
        return Err(invalid());
    }
    Ok(ImageRef {
        stack: PathBuf::from(stack),
        index,
    })
}

/// Validate every row of the particle table and convert it to typed
/// records. The first problem found is returned; nothing is partially
/// accepted.
pub fn parse_particle_rows(
    particles: &StarBlock,
    optics: Option<&StarBlock>,
    pixel_size_override: Option<f64>,
) -> Result<Vec<ParticleRow>> {
    let fields = FieldSource::new(particles, optics);

    for column in REQUIRED_COLUMNS {
        fields.require(column)?;
    }

    let origin_units = if fields.available(COL_ORIGIN_X) && fields.available(COL_ORIGIN_Y) {
        OriginUnits::Pixels
    } else if fields.available(COL_ORIGIN_X_ANGST) && fields.available(COL_ORIGIN_Y_ANGST) {
        OriginUnits::Angstrom
    } else {
        fields.require(COL_ORIGIN_X)?;
        fields.require(COL_ORIGIN_Y)?;
        OriginUnits::Pixels
    };

    let pixel_source = match pixel_size_override {
        Some(apix) if apix > 0.0 => PixelSizeSource::Fixed(apix),
        Some(apix) => {
            return Err(SubtractError::Pipeline(format!(
                "Pixel size must be positive, got {}",
                apix
            )))
        }
        None if fields.available(COL_IMAGE_PIXEL_SIZE) => PixelSizeSource::ImagePixelSize,
        None if fields.available(COL_DETECTOR_PIXEL_SIZE)
            && fields.available(COL_MAGNIFICATION) =>
        {
            PixelSizeSource::Detector
        }
        None => {
            return Err(SubtractError::MissingColumn {
                block: particles.name.clone(),
                column: COL_IMAGE_PIXEL_SIZE.to_string(),
            })
        }
    };

    (0..particles.len())
        .map(|row| {
            let image_name = fields.text(row, COL_IMAGE_NAME)?.to_string();
            let source = parse_image_name(row, &image_name)?;

            let pixel_size = match pixel_source {
                PixelSizeSource::Fixed(apix) => apix,
                PixelSizeSource::ImagePixelSize => fields.number(row, COL_IMAGE_PIXEL_SIZE)?,
                PixelSizeSource::Detector => {
                    10_000.0 * fields.number(row, COL_DETECTOR_PIXEL_SIZE)?
                        / fields.number(row, COL_MAGNIFICATION)?
                }
            };
            if pixel_size <= 0.0 || !pixel_size.is_finite() {
                return Err(SubtractError::InvalidField {
                    row,
                    column: COL_IMAGE_PIXEL_SIZE.to_string(),
                    value: pixel_size.to_string(),
                });
            }

            let origin = match origin_units {
                OriginUnits::Pixels => OriginShift {
                    x: fields.number(row, COL_ORIGIN_X)?,
                    y: fields.number(row, COL_ORIGIN_Y)?,
                },
                OriginUnits::Angstrom => OriginShift {
                    x: fields.number(row, COL_ORIGIN_X_ANGST)? / pixel_size,
                    y: fields.number(row, COL_ORIGIN_Y_ANGST)? / pixel_size,
                },
            };

            Ok(ParticleRow {
                row,
                image_name,
                source,
                ctf: CtfParams {
                    defocus_u: fields.number(row, COL_DEFOCUS_U)?,
                    defocus_v: fields.number(row, COL_DEFOCUS_V)?,
                    defocus_angle: fields.number(row, COL_DEFOCUS_ANGLE)?,
                    phase_shift: fields.number(row, COL_PHASE_SHIFT)?,
                    voltage: fields.number(row, COL_VOLTAGE)?,
                    amplitude_contrast: fields.number(row, COL_AMPLITUDE_CONTRAST)?,
                    spherical_aberration: fields.number(row, COL_SPHERICAL_ABERRATION)?,
                },
                euler: EulerAngles {
                    rot: fields.number(row, COL_ANGLE_ROT)?,
                    tilt: fields.number(row, COL_ANGLE_TILT)?,
                    psi: fields.number(row, COL_ANGLE_PSI)?,
                },
                origin,
                pixel_size,
            })
        })
        .collect()
}
