use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::{Array2, Array3};

use crate::error::{Result, SubtractError};
use crate::io::mrc::{MrcMode, MRC_HEADER_SIZE, MRC_MAP_TAG};

const MRC_VERSION: i32 = 20140;
const LABEL: &str = "cryosub";

/// Streaming writer for float32 MRC stacks.
///
/// Images are appended one at a time; the header (section count, cell and
/// density statistics) is rewritten by [`finish`](Self::finish).
pub struct MrcStackWriter {
    writer: BufWriter<File>,
    nx: usize,
    ny: usize,
    sections: usize,
    pixel_size: f32,
    ispg: i32,
    stats: DensityStats,
}

impl MrcStackWriter {
    /// Create (or truncate) `path` for images of shape `(ny, nx)`.
    pub fn create(path: &Path, ny: usize, nx: usize, pixel_size: f64) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = Self {
            writer: BufWriter::new(file),
            nx,
            ny,
            sections: 0,
            pixel_size: pixel_size as f32,
            ispg: 0,
            stats: DensityStats::default(),
        };
        writer.write_header()?;
        Ok(writer)
    }

    pub fn sections(&self) -> usize {
        self.sections
    }

    /// Append one image.
    pub fn append(&mut self, image: &Array2<f32>) -> Result<()> {
        if image.dim() != (self.ny, self.nx) {
            return Err(SubtractError::ShapeMismatch {
                expected: (self.ny, self.nx),
                actual: image.dim(),
            });
        }
        for &v in image.iter() {
            self.writer.write_f32::<LittleEndian>(v)?;
            self.stats.add(v);
        }
        self.sections += 1;
        Ok(())
    }

    /// Rewrite the header with final counts and flush.
    pub fn finish(mut self) -> Result<()> {
        self.writer.seek(SeekFrom::Start(0))?;
        self.write_header()?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let w = &mut self.writer;
        let (nx, ny, nz) = (self.nx as i32, self.ny as i32, self.sections as i32);
        let psz = self.pixel_size;

        w.write_i32::<LittleEndian>(nx)?;
        w.write_i32::<LittleEndian>(ny)?;
        w.write_i32::<LittleEndian>(nz)?;
        w.write_i32::<LittleEndian>(MrcMode::Float32.code())?;
        // nxstart, nystart, nzstart
        for _ in 0..3 {
            w.write_i32::<LittleEndian>(0)?;
        }
        // mx, my, mz
        w.write_i32::<LittleEndian>(nx)?;
        w.write_i32::<LittleEndian>(ny)?;
        w.write_i32::<LittleEndian>(nz)?;
        // cell lengths and angles
        w.write_f32::<LittleEndian>(nx as f32 * psz)?;
        w.write_f32::<LittleEndian>(ny as f32 * psz)?;
        w.write_f32::<LittleEndian>(nz as f32 * psz)?;
        for _ in 0..3 {
            w.write_f32::<LittleEndian>(90.0)?;
        }
        // mapc, mapr, maps
        w.write_i32::<LittleEndian>(1)?;
        w.write_i32::<LittleEndian>(2)?;
        w.write_i32::<LittleEndian>(3)?;
        let (dmin, dmax, dmean, rms) = self.stats.summary();
        w.write_f32::<LittleEndian>(dmin)?;
        w.write_f32::<LittleEndian>(dmax)?;
        w.write_f32::<LittleEndian>(dmean)?;
        w.write_i32::<LittleEndian>(self.ispg)?;
        // nsymbt
        w.write_i32::<LittleEndian>(0)?;
        // extra: 8 bytes, exttyp, nversion, then padding up to byte 196
        w.write_all(&[0u8; 8])?;
        w.write_all(&[0u8; 4])?;
        w.write_i32::<LittleEndian>(MRC_VERSION)?;
        w.write_all(&[0u8; 196 - 112])?;
        // origin
        for _ in 0..3 {
            w.write_f32::<LittleEndian>(0.0)?;
        }
        w.write_all(MRC_MAP_TAG)?;
        w.write_all(&[0x44, 0x44, 0x00, 0x00])?;
        w.write_f32::<LittleEndian>(rms)?;
        // nlabl and labels (10 x 80 bytes)
        w.write_i32::<LittleEndian>(1)?;
        let mut labels = [b' '; 800];
        labels[..LABEL.len()].copy_from_slice(LABEL.as_bytes());
        w.write_all(&labels)?;

        debug_assert_eq!(224 + 800, MRC_HEADER_SIZE);
        Ok(())
    }
}

/// Write a complete stack in one call.
pub fn write_stack(path: &Path, images: &[Array2<f32>], pixel_size: f64) -> Result<()> {
    let (ny, nx) = images.first().map(|im| im.dim()).unwrap_or((0, 0));
    let mut writer = MrcStackWriter::create(path, ny, nx, pixel_size)?;
    for image in images {
        writer.append(image)?;
    }
    writer.finish()
}

/// Write a 3D map `(nz, ny, nx)`.
pub fn write_volume(path: &Path, volume: &Array3<f32>, pixel_size: f64) -> Result<()> {
    let (_, ny, nx) = volume.dim();
    let mut writer = MrcStackWriter::create(path, ny, nx, pixel_size)?;
    writer.ispg = 1;
    for section in volume.outer_iter() {
        writer.append(&section.to_owned())?;
    }
    writer.finish()
}

#[derive(Default)]
struct DensityStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f32,
    max: f32,
}

impl DensityStats {
    fn add(&mut self, v: f32) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v as f64;
        self.sum_sq += (v as f64) * (v as f64);
    }

    fn summary(&self) -> (f32, f32, f32, f32) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0, 0.0);
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        (self.min, self.max, mean as f32, var.sqrt() as f32)
    }
}
