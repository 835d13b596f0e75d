use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;
use num_complex::Complex32;

use crate::error::{Result, SubtractError};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Element types accepted for Fourier volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ComplexDtype {
    C8,
    C16,
}

impl ComplexDtype {
    fn parse(descr: &str) -> Result<Self> {
        match descr {
            "<c8" => Ok(Self::C8),
            "<c16" => Ok(Self::C16),
            other => Err(SubtractError::InvalidNpy(format!(
                "Unsupported dtype '{}' (expected <c8 or <c16)",
                other
            ))),
        }
    }
}

#[derive(Debug)]
struct NpyHeader {
    dtype: ComplexDtype,
    shape: Vec<usize>,
    data_offset: usize,
}

/// Read a C-ordered 3D complex array (`<c8` or `<c16`) as single precision.
pub fn read_complex_volume(path: &Path) -> Result<Array3<Complex32>> {
    let bytes = std::fs::read(path)?;
    let header = parse_header(&bytes)?;
    if header.shape.len() != 3 {
        return Err(SubtractError::InvalidNpy(format!(
            "Expected a 3D array, got shape {:?}",
            header.shape
        )));
    }

    let element_size: usize = match header.dtype {
        ComplexDtype::C8 => 8,
        ComplexDtype::C16 => 16,
    };
    let too_large = || {
        SubtractError::InvalidNpy(format!(
            "Shape {:?} exceeds addressable size",
            header.shape
        ))
    };
    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(too_large)?;
    let needed = count
        .checked_mul(element_size)
        .and_then(|n| n.checked_add(header.data_offset))
        .ok_or_else(too_large)?;
    if bytes.len() < needed {
        return Err(SubtractError::InvalidNpy(format!(
            "Truncated data: expected {} bytes, got {}",
            needed,
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(&bytes[header.data_offset..needed]);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match header.dtype {
            ComplexDtype::C8 => Complex32::new(
                cursor.read_f32::<LittleEndian>()?,
                cursor.read_f32::<LittleEndian>()?,
            ),
            ComplexDtype::C16 => Complex32::new(
                cursor.read_f64::<LittleEndian>()? as f32,
                cursor.read_f64::<LittleEndian>()? as f32,
            ),
        };
        values.push(value);
    }

    let shape = (header.shape[0], header.shape[1], header.shape[2]);
    Array3::from_shape_vec(shape, values).map_err(|e| SubtractError::InvalidNpy(e.to_string()))
}

/// Write a 3D complex array as NPY version 1.0, dtype `<c8`, C order.
pub fn write_complex_volume(path: &Path, data: &Array3<Complex32>) -> Result<()> {
    let (a, b, c) = data.dim();
    let dict = format!(
        "{{'descr': '<c8', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
        a, b, c
    );
    // magic + version + u16 length + dict + newline, padded to NPY_ALIGN
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(NPY_MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_u16::<LittleEndian>(header_len as u16)?;
    w.write_all(dict.as_bytes())?;
    w.write_all(&vec![b' '; padding])?;
    w.write_all(b"\n")?;
    for v in data.iter() {
        w.write_f32::<LittleEndian>(v.re)?;
        w.write_f32::<LittleEndian>(v.im)?;
    }
    w.flush()?;
    Ok(())
}

fn parse_header(bytes: &[u8]) -> Result<NpyHeader> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(SubtractError::InvalidNpy("Missing NUMPY magic".into()));
    }
    let major = bytes[6];
    let (header_len, start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(SubtractError::InvalidNpy("Truncated header".into()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        other => {
            return Err(SubtractError::InvalidNpy(format!(
                "Unsupported NPY version {}",
                other
            )))
        }
    };
    let end = start + header_len;
    if bytes.len() < end {
        return Err(SubtractError::InvalidNpy("Truncated header".into()));
    }
    let text = std::str::from_utf8(&bytes[start..end])
        .map_err(|_| SubtractError::InvalidNpy("Header is not valid text".into()))?;

    let descr = dict_value(text, "descr")
        .and_then(|v| v.split(['\'', '"']).nth(1))
        .ok_or_else(|| SubtractError::InvalidNpy("Header lacks 'descr'".into()))?;
    let dtype = ComplexDtype::parse(descr)?;

    let fortran = dict_value(text, "fortran_order")
        .map(|v| v.trim_start().starts_with("True"))
        .unwrap_or(false);
    if fortran {
        return Err(SubtractError::InvalidNpy(
            "Fortran-ordered arrays are not supported".into(),
        ));
    }

    let shape_text = dict_value(text, "shape")
        .and_then(|v| {
            let open = v.find('(')?;
            let close = open + v[open..].find(')')?;
            Some(&v[open + 1..close])
        })
        .ok_or_else(|| SubtractError::InvalidNpy("Header lacks 'shape'".into()))?;
    let shape = shape_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| SubtractError::InvalidNpy(format!("Bad shape entry '{}'", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader {
        dtype,
        shape,
        data_offset: end,
    })
}

/// Text following `'key':` in a header dict.
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let pos = text.find(&pattern)?;
    Some(&text[pos + pattern.len()..])
}
