use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::{Array2, Array3};

use crate::error::{Result, SubtractError};

pub const MRC_HEADER_SIZE: usize = 1024;
pub const MRC_MAP_TAG: &[u8; 4] = b"MAP ";

/// Pixel encodings understood by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MrcMode {
    Int8,
    Int16,
    Float32,
    Uint16,
}

impl MrcMode {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Int8),
            1 => Ok(Self::Int16),
            2 => Ok(Self::Float32),
            6 => Ok(Self::Uint16),
            other => Err(SubtractError::InvalidMrc(format!(
                "Unsupported MRC mode {}",
                other
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Int8 => 0,
            Self::Int16 => 1,
            Self::Float32 => 2,
            Self::Uint16 => 6,
        }
    }

    pub fn bytes_per_voxel(&self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// The fields of the 1024-byte MRC header this crate uses.
#[derive(Clone, Debug)]
pub struct MrcHeader {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub mode: MrcMode,
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    /// Cell dimensions in Å.
    pub cell: [f32; 3],
    pub dmin: f32,
    pub dmax: f32,
    pub dmean: f32,
    pub ispg: i32,
    /// Bytes of extended header following the main header.
    pub nsymbt: usize,
    pub rms: f32,
    pub little_endian: bool,
}

impl MrcHeader {
    /// Å per pixel along x, falling back to 1 when the header has no cell.
    pub fn pixel_size(&self) -> f64 {
        if self.mx > 0 && self.cell[0] > 0.0 {
            self.cell[0] as f64 / self.mx as f64
        } else {
            1.0
        }
    }

    /// Bytes per 2D section. Fails when the header dimensions overflow.
    pub fn section_byte_size(&self) -> Result<usize> {
        self.nx
            .checked_mul(self.ny)
            .and_then(|n| n.checked_mul(self.mode.bytes_per_voxel()))
            .ok_or_else(|| self.too_large())
    }

    /// Bytes of voxel data in the whole file.
    pub fn data_byte_size(&self) -> Result<usize> {
        self.section_byte_size()?
            .checked_mul(self.nz)
            .ok_or_else(|| self.too_large())
    }

    pub fn data_offset(&self) -> usize {
        MRC_HEADER_SIZE + self.nsymbt
    }

    /// Offset one past the last voxel byte.
    pub fn data_end(&self) -> Result<usize> {
        self.data_offset()
            .checked_add(self.data_byte_size()?)
            .ok_or_else(|| self.too_large())
    }

    fn too_large(&self) -> SubtractError {
        SubtractError::InvalidMrc(format!(
            "Dimensions {}x{}x{} exceed addressable size",
            self.nx, self.ny, self.nz
        ))
    }
}

/// Memory-mapped MRC/MRCS reader.
pub struct MrcReader {
    mmap: Mmap,
    pub header: MrcHeader,
}

impl MrcReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < MRC_HEADER_SIZE {
            return Err(SubtractError::InvalidMrc(format!(
                "{}: file too small for MRC header",
                path.display()
            )));
        }

        let header = parse_header(&mmap[..MRC_HEADER_SIZE])?;
        let expected = header.data_end()?;
        if mmap.len() < expected {
            return Err(SubtractError::InvalidMrc(format!(
                "{}: truncated, expected at least {} bytes, got {}",
                path.display(),
                expected,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header })
    }

    /// Number of 2D sections (images in a stack).
    pub fn section_count(&self) -> usize {
        self.header.nz
    }

    fn section_raw(&self, index: usize) -> Result<&[u8]> {
        let total = self.section_count();
        if index >= total {
            return Err(SubtractError::ImageIndexOutOfRange { index, total });
        }
        // Bounded by data_end(), checked in open().
        let size = self.header.section_byte_size()?;
        let offset = self.header.data_offset() + index * size;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Read one 2D section (0-based) as `(ny, nx)`.
    pub fn read_section(&self, index: usize) -> Result<Array2<f32>> {
        let raw = self.section_raw(index)?;
        let values = decode(raw, self.header.mode, self.header.little_endian)?;
        Array2::from_shape_vec((self.header.ny, self.header.nx), values)
            .map_err(|e| SubtractError::InvalidMrc(e.to_string()))
    }

    /// Read the whole file as a volume `(nz, ny, nx)`.
    pub fn read_volume(&self) -> Result<Array3<f32>> {
        let start = self.header.data_offset();
        let end = self.header.data_end()?;
        let values = decode(&self.mmap[start..end], self.header.mode, self.header.little_endian)?;
        Array3::from_shape_vec((self.header.nz, self.header.ny, self.header.nx), values)
            .map_err(|e| SubtractError::InvalidMrc(e.to_string()))
    }
}

/// Read a whole map from disk.
pub fn read_volume(path: &Path) -> Result<(Array3<f32>, f64)> {
    let reader = MrcReader::open(path)?;
    let volume = reader.read_volume()?;
    Ok((volume, reader.header.pixel_size()))
}

fn parse_header(buf: &[u8]) -> Result<MrcHeader> {
    // Machine stamp: 0x44 0x44 little-endian, 0x11 0x11 big-endian.
    // Some writers leave it zero; those are little-endian in practice.
    let little_endian = buf[212] != 0x11;
    if little_endian {
        parse_header_with::<LittleEndian>(buf, true)
    } else {
        parse_header_with::<BigEndian>(buf, false)
    }
}

fn parse_header_with<B: ByteOrder>(buf: &[u8], little_endian: bool) -> Result<MrcHeader> {
    let mut cursor = Cursor::new(buf);
    let nx = cursor.read_i32::<B>()?;
    let ny = cursor.read_i32::<B>()?;
    let nz = cursor.read_i32::<B>()?;
    let mode = cursor.read_i32::<B>()?;
    let _start = [
        cursor.read_i32::<B>()?,
        cursor.read_i32::<B>()?,
        cursor.read_i32::<B>()?,
    ];
    let mx = cursor.read_i32::<B>()?;
    let my = cursor.read_i32::<B>()?;
    let mz = cursor.read_i32::<B>()?;
    let cell = [
        cursor.read_f32::<B>()?,
        cursor.read_f32::<B>()?,
        cursor.read_f32::<B>()?,
    ];

    if nx <= 0 || ny <= 0 || nz < 0 {
        return Err(SubtractError::InvalidMrc(format!(
            "Invalid dimensions {}x{}x{}",
            nx, ny, nz
        )));
    }

    let mut cursor = Cursor::new(&buf[76..]);
    let dmin = cursor.read_f32::<B>()?;
    let dmax = cursor.read_f32::<B>()?;
    let dmean = cursor.read_f32::<B>()?;
    let ispg = cursor.read_i32::<B>()?;
    let nsymbt = cursor.read_i32::<B>()?.max(0) as usize;
    let rms = B::read_f32(&buf[216..220]);

    Ok(MrcHeader {
        nx: nx as usize,
        ny: ny as usize,
        nz: nz as usize,
        mode: MrcMode::from_code(mode)?,
        mx: mx.max(0) as usize,
        my: my.max(0) as usize,
        mz: mz.max(0) as usize,
        cell,
        dmin,
        dmax,
        dmean,
        ispg,
        nsymbt,
        rms,
        little_endian,
    })
}

fn decode(raw: &[u8], mode: MrcMode, little_endian: bool) -> Result<Vec<f32>> {
    if little_endian {
        decode_with::<LittleEndian>(raw, mode)
    } else {
        decode_with::<BigEndian>(raw, mode)
    }
}

fn decode_with<B: ByteOrder>(raw: &[u8], mode: MrcMode) -> Result<Vec<f32>> {
    let count = raw.len() / mode.bytes_per_voxel();
    let mut out = vec![0.0f32; count];
    match mode {
        MrcMode::Int8 => {
            for (dst, &b) in out.iter_mut().zip(raw) {
                *dst = b as i8 as f32;
            }
        }
        MrcMode::Int16 => {
            let mut tmp = vec![0i16; count];
            B::read_i16_into(raw, &mut tmp);
            for (dst, v) in out.iter_mut().zip(tmp) {
                *dst = v as f32;
            }
        }
        MrcMode::Uint16 => {
            let mut tmp = vec![0u16; count];
            B::read_u16_into(raw, &mut tmp);
            for (dst, v) in out.iter_mut().zip(tmp) {
                *dst = v as f32;
            }
        }
        MrcMode::Float32 => B::read_f32_into(raw, &mut out),
    }
    Ok(out)
}
