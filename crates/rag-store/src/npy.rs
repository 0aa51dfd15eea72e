//! Binary vector file codec.
//!
//! The vector index is stored as a NumPy `.npy` (format 1.0) array of
//! little-endian float32 with shape `(N, 2, D)`: for each entry the raw
//! vector followed by its normalized form.

use std::io::{Read, Write};

use crate::error::StoreError;
use crate::index::VectorIndex;

/// Leading bytes of every `.npy` file.
pub const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

const HEADER_ALIGN: usize = 64;
const MAX_HEADER_LEN: usize = 64 * 1024;
const F32_SIZE: usize = std::mem::size_of::<f32>();

fn header_text(n: usize, d: usize) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, 2, {}), }}",
        n, d
    );
    // magic + version + u16 length + dict + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;

    let mut text = dict.into_bytes();
    text.extend(std::iter::repeat(b' ').take(padding));
    text.push(b'\n');
    text
}

/// Write every (raw, normalized) pair of `index`.
pub fn write_index<W: Write>(mut writer: W, index: &VectorIndex) -> Result<(), StoreError> {
    let n = index.len();
    let d = index.dimension().unwrap_or(0);

    let header = header_text(n, d);
    let header_len = u16::try_from(header.len())
        .map_err(|_| StoreError::Format(format!("header too long: {} bytes", header.len())))?;

    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(&header)?;

    let mut row = Vec::with_capacity(2 * d * F32_SIZE);
    for i in 0..n {
        row.clear();
        let (raw, normalized) = match (index.raw_at(i), index.normalized_at(i)) {
            (Some(raw), Some(normalized)) => (raw, normalized),
            _ => return Err(StoreError::Format(format!("missing vector row {}", i))),
        };
        for value in raw.iter().chain(normalized.iter()) {
            row.extend_from_slice(&value.to_le_bytes());
        }
        writer.write_all(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Value text of `key` in a `.npy` header dict.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{}':", key);
    let start = dict.find(&needle)? + needle.len();
    let rest = dict[start..].trim_start();

    let end = match rest.chars().next()? {
        '(' => rest.find(')')? + 1,
        quote @ ('\'' | '"') => rest[1..].find(quote)? + 2,
        _ => rest.find([',', '}']).unwrap_or(rest.len()),
    };
    Some(rest[..end].trim())
}

fn parse_shape(text: &str) -> Result<Vec<usize>, StoreError> {
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| StoreError::Format(format!("bad shape {}", text)))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|e| StoreError::Format(format!("bad shape entry {:?}: {}", part, e)))
        })
        .collect()
}

/// Read a `(N, 2, D)` float32 array back into a vector index.
pub fn read_index<R: Read>(mut reader: R) -> Result<VectorIndex, StoreError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != NPY_MAGIC {
        return Err(StoreError::Format("missing .npy magic".to_string()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        other => {
            return Err(StoreError::Format(format!(
                "unsupported .npy version {}.{}",
                other, version[1]
            )))
        }
    };

    if header_len > MAX_HEADER_LEN {
        return Err(StoreError::Format(format!(
            "header length {} exceeds {} bytes",
            header_len, MAX_HEADER_LEN
        )));
    }
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let dict = String::from_utf8(header)
        .map_err(|_| StoreError::Format("header is not valid text".to_string()))?;

    let descr = dict_value(&dict, "descr")
        .ok_or_else(|| StoreError::Format("header has no descr".to_string()))?;
    if descr.trim_matches(|c| c == '\'' || c == '"') != "<f4" {
        return Err(StoreError::Format(format!(
            "expected little-endian float32, got {}",
            descr
        )));
    }
    if dict_value(&dict, "fortran_order") != Some("False") {
        return Err(StoreError::Format("fortran order is not supported".to_string()));
    }
    let shape = parse_shape(
        dict_value(&dict, "shape")
            .ok_or_else(|| StoreError::Format("header has no shape".to_string()))?,
    )?;
    let (n, d) = match shape.as_slice() {
        [n, 2, d] => (*n, *d),
        _ => {
            return Err(StoreError::Format(format!(
                "expected shape (N, 2, D), got {:?}",
                shape
            )))
        }
    };
    if d == 0 && n > 0 {
        return Err(StoreError::Format(format!(
            "shape ({}, 2, 0) has entries without components",
            n
        )));
    }
    let expected = n
        .checked_mul(2)
        .and_then(|x| x.checked_mul(d))
        .and_then(|x| x.checked_mul(F32_SIZE))
        .ok_or_else(|| {
            StoreError::Format(format!("shape ({}, 2, {}) overflows the address space", n, d))
        })?;

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    if data.len() != expected {
        return Err(StoreError::Format(format!(
            "expected {} data bytes for shape ({}, 2, {}), found {}",
            expected,
            n,
            d,
            data.len()
        )));
    }

    let values: Vec<f32> = data
        .chunks_exact(F32_SIZE)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut index = VectorIndex::with_dimension(d);
    for entry in values.chunks_exact(2 * d.max(1)).take(n) {
        let (raw, normalized) = entry.split_at(d);
        index.push(raw, normalized)?;
    }
    Ok(index)
}
