use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::consts::STACK_EXTENSION;
use crate::error::{Result, SubtractError};
use crate::particle::{Destination, ParticleRecord};

use super::records::ParticleRow;

/// Naming rule for output stacks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputLayout {
    pub dest_dir: PathBuf,
    pub prefix: String,
    pub suffix: String,
}

impl OutputLayout {
    /// `dest_dir / (prefix + stem + suffix + ".mrcs")` for an input stack,
    /// where `stem` is the file name without a trailing `.mrcs`.
    pub fn destination_path(&self, source_stack: &Path) -> PathBuf {
        let name = source_stack
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name.strip_suffix(STACK_EXTENSION).unwrap_or(&name);
        self.dest_dir.join(format!(
            "{}{}{}{}",
            self.prefix, stem, self.suffix, STACK_EXTENSION
        ))
    }
}

/// Particles written to one output stack, ordered by destination index.
#[derive(Clone, Debug)]
pub struct StackGroup {
    pub path: PathBuf,
    pub particles: Vec<ParticleRecord>,
}

impl StackGroup {
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// Assign destinations: rows are stable-sorted by their original image
/// identifier, then numbered `0, 1, 2, ...` within each destination stack.
/// The returned records are in input row order.
pub fn assign_destinations(
    rows: Vec<ParticleRow>,
    layout: &OutputLayout,
) -> Result<Vec<ParticleRecord>> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].image_name.cmp(&rows[b].image_name));

    let mut next_index: HashMap<PathBuf, usize> = HashMap::new();
    let mut destinations: Vec<Option<Destination>> = vec![None; rows.len()];
    for &i in &order {
        let stack = layout.destination_path(&rows[i].source.stack);
        if stack == rows[i].source.stack {
            return Err(SubtractError::Pipeline(format!(
                "Output stack {} would overwrite its input; set a destination directory, prefix or suffix",
                stack.display()
            )));
        }
        let counter = next_index.entry(stack.clone()).or_insert(0);
        destinations[i] = Some(Destination {
            stack,
            index: *counter,
        });
        *counter += 1;
    }

    rows.into_iter()
        .zip(destinations)
        .map(|(row, destination)| {
            let destination = destination.ok_or_else(|| {
                SubtractError::Pipeline(format!("Row {} received no destination", row.row))
            })?;
            Ok(ParticleRecord {
                row: row.row,
                source: row.source,
                destination,
                ctf: row.ctf,
                euler: row.euler,
                origin: row.origin,
                pixel_size: row.pixel_size,
            })
        })
        .collect()
}

/// Group records by destination stack (ascending path), each group sorted
/// by destination index.
pub fn group_by_destination(records: &[ParticleRecord]) -> Vec<StackGroup> {
    let mut groups: BTreeMap<PathBuf, Vec<ParticleRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.destination.stack.clone())
            .or_default()
            .push(record.clone());
    }
    groups
        .into_iter()
        .map(|(path, mut particles)| {
            particles.sort_by_key(|p| p.destination.index);
            StackGroup { path, particles }
        })
        .collect()
}
