pub mod plan;
pub mod records;

use std::path::Path;

use tracing::debug;

use crate::error::{Result, SubtractError};
use crate::io::star::StarFile;
use crate::particle::ParticleRecord;

pub use plan::{assign_destinations, group_by_destination, OutputLayout, StackGroup};
pub use records::{parse_image_name, parse_particle_rows, ParticleRow};

use records::{COL_IMAGE_NAME, COL_ORIGINAL_IMAGE_NAME};

/// Particle metadata: the STAR file as read plus the typed records built
/// from its particle table.
#[derive(Clone, Debug)]
pub struct ParticleTable {
    star: StarFile,
    block: usize,
    records: Vec<ParticleRecord>,
}

impl ParticleTable {
    pub fn read(path: &Path, layout: &OutputLayout, pixel_size: Option<f64>) -> Result<Self> {
        debug!(path = %path.display(), "Reading particle STAR file");
        let star = StarFile::read(path)?;
        Self::from_star(star, layout, pixel_size)
    }

    /// Validate all rows and assign destinations.
    pub fn from_star(star: StarFile, layout: &OutputLayout, pixel_size: Option<f64>) -> Result<Self> {
        let block = star.particle_block_index().ok_or_else(|| {
            SubtractError::Star("no particle table (block with rlnImageName)".into())
        })?;
        let optics = star
            .blocks
            .iter()
            .enumerate()
            .find(|(i, b)| *i != block && b.name == "optics")
            .map(|(_, b)| b);
        let rows = parse_particle_rows(&star.blocks[block], optics, pixel_size)?;
        let records = assign_destinations(rows, layout)?;
        debug!(particles = records.len(), "Read particle STAR file");
        Ok(Self {
            star,
            block,
            records,
        })
    }

    /// Records in input row order.
    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn groups(&self) -> Vec<StackGroup> {
        group_by_destination(&self.records)
    }

    /// Output metadata: image names point at the subtracted stacks and the
    /// originals move to `rlnOriginalImageName`. Row order is unchanged.
    pub fn output_star(&self) -> Result<StarFile> {
        let mut star = self.star.clone();
        let table = &mut star.blocks[self.block];
        let originals: Vec<String> = (0..table.len())
            .map(|row| table.value(row, COL_IMAGE_NAME).unwrap_or_default().to_string())
            .collect();
        let renamed: Vec<String> = self
            .records
            .iter()
            .map(|r| r.destination.to_string())
            .collect();
        table.set_column(COL_ORIGINAL_IMAGE_NAME, originals)?;
        table.set_column(COL_IMAGE_NAME, renamed)?;
        Ok(star)
    }

    pub fn write_output(&self, path: &Path) -> Result<()> {
        self.output_star()?.write(path)
    }
}
