use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::{Result, SubtractError};
use crate::io::mrc::MrcReader;
use crate::io::mrc_writer::MrcStackWriter;
use crate::particle::ImageRef;

/// Dimensions of a source particle stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackInfo {
    /// `(ny, nx)` of every image.
    pub shape: (usize, usize),
    pub count: usize,
}

/// An output stack being written. Nothing is visible at the final path
/// until [`commit`](StackSink::commit).
pub trait StackSink: Send {
    fn append(&mut self, image: &Array2<f32>) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard everything written so far.
    fn abort(self: Box<Self>);
}

/// Source of particle images and destination of subtracted stacks.
pub trait StackStore: Sync {
    fn stack_info(&self, stack: &Path) -> Result<StackInfo>;

    fn read_particle(&self, image: &ImageRef) -> Result<Array2<f32>>;

    fn create_stack(
        &self,
        path: &Path,
        shape: (usize, usize),
        pixel_size: f64,
    ) -> Result<Box<dyn StackSink>>;
}

/// MRC stacks on the local filesystem. Source stacks are memory-mapped once
/// and shared.
#[derive(Default)]
pub struct MrcStackStore {
    readers: Mutex<HashMap<PathBuf, Arc<MrcReader>>>,
}

impl MrcStackStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reader(&self, stack: &Path) -> Result<Arc<MrcReader>> {
        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reader) = readers.get(stack) {
            return Ok(Arc::clone(reader));
        }
        let reader = Arc::new(MrcReader::open(stack)?);
        debug!(
            path = %stack.display(),
            images = reader.section_count(),
            "Opened particle stack"
        );
        readers.insert(stack.to_path_buf(), Arc::clone(&reader));
        Ok(reader)
    }
}

impl StackStore for MrcStackStore {
    fn stack_info(&self, stack: &Path) -> Result<StackInfo> {
        let reader = self.reader(stack)?;
        Ok(StackInfo {
            shape: (reader.header.ny, reader.header.nx),
            count: reader.section_count(),
        })
    }

    fn read_particle(&self, image: &ImageRef) -> Result<Array2<f32>> {
        let reader = self.reader(&image.stack)?;
        let index = image
            .index
            .checked_sub(1)
            .ok_or(SubtractError::ImageIndexOutOfRange {
                index: image.index,
                total: reader.section_count(),
            })?;
        reader.read_section(index)
    }

    fn create_stack(
        &self,
        path: &Path,
        shape: (usize, usize),
        pixel_size: f64,
    ) -> Result<Box<dyn StackSink>> {
        let partial = partial_path(path);
        let writer = MrcStackWriter::create(&partial, shape.0, shape.1, pixel_size)?;
        Ok(Box::new(MrcStackSink {
            writer,
            partial,
            path: path.to_path_buf(),
        }))
    }
}

/// Sibling path used while a stack is being written.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

struct MrcStackSink {
    writer: MrcStackWriter,
    partial: PathBuf,
    path: PathBuf,
}

impl StackSink for MrcStackSink {
    fn append(&mut self, image: &Array2<f32>) -> Result<()> {
        self.writer.append(image)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            writer,
            partial,
            path,
        } = *self;
        let sections = writer.sections();
        if let Err(e) = writer.finish() {
            remove_partial(&partial);
            return Err(e);
        }
        std::fs::rename(&partial, &path).map_err(|e| {
            remove_partial(&partial);
            SubtractError::Io(e)
        })?;
        debug!(path = %path.display(), sections, "Stack committed");
        Ok(())
    }

    fn abort(self: Box<Self>) {
        let Self { writer, partial, .. } = *self;
        drop(writer);
        remove_partial(&partial);
    }
}

fn remove_partial(partial: &Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %partial.display(), error = %e, "Could not remove partial stack");
        }
    }
}
