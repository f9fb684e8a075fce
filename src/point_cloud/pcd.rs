//! Minimal PCD (Point Cloud Library) reader.
//!
//! Supports `DATA ascii`, `DATA binary` and `DATA binary_compressed` (LZF)
//! with floating point `x`/`y`/`z` fields of size 4 or 8. Any other fields
//! are skipped. Points with a non-finite coordinate are dropped.

use std::fs;
use std::path::Path;

use crate::error::{AnimeError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataKind {
    Ascii,
    Binary,
    BinaryCompressed,
}

#[derive(Clone, Debug)]
struct Field {
    name: String,
    size: usize,
    kind: char,
    count: usize,
}

#[derive(Clone, Debug)]
struct Header {
    fields: Vec<Field>,
    points: usize,
    /// Bytes per point record; checked against overflow when parsed
    stride: usize,
    data: DataKind,
}

impl Header {
    /// Bytes for all declared points, `None` when that overflows
    fn body_len(&self) -> Option<usize> {
        self.stride.checked_mul(self.points)
    }

    /// Index of a named field
    fn field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Byte offset of field `idx` inside a point record
    fn byte_offset(&self, idx: usize) -> usize {
        self.fields[..idx].iter().map(|f| f.size * f.count).sum()
    }

    /// Column of field `idx` in an ascii row
    fn column(&self, idx: usize) -> usize {
        self.fields[..idx].iter().map(|f| f.count).sum()
    }
}

/// Read every valid point of a PCD file as `[x, y, z]`
pub fn read_pcd(path: &Path) -> Result<Vec<[f64; 3]>> {
    let bytes = fs::read(path)
        .map_err(|e| AnimeError::data_format(path.display().to_string(), e.to_string()))?;
    parse_pcd(&bytes, &path.display().to_string())
}

/// Parse PCD bytes; `source_name` is used in error messages
pub fn parse_pcd(bytes: &[u8], source_name: &str) -> Result<Vec<[f64; 3]>> {
    let bad = |reason: String| AnimeError::data_format(source_name, reason);

    let (header, body) = parse_header(bytes).map_err(bad)?;
    let xyz = ["x", "y", "z"].map(|n| header.field(n));
    let xyz = match xyz {
        [Some(x), Some(y), Some(z)] => [x, y, z],
        _ => return Err(bad("PCD needs x, y and z fields".to_string())),
    };
    for &i in &xyz {
        let f = &header.fields[i];
        if f.kind != 'F' || !(f.size == 4 || f.size == 8) {
            return Err(bad(format!(
                "field {} must be a float of size 4 or 8, got {}{}",
                f.name, f.kind, f.size
            )));
        }
    }

    let points = match header.data {
        DataKind::Ascii => parse_ascii(&header, body, xyz),
        DataKind::Binary => parse_binary(&header, body, xyz),
        DataKind::BinaryCompressed => parse_compressed(&header, body, xyz),
    }
    .map_err(bad)?;

    Ok(points.into_iter().filter(|p| p.iter().all(|v| v.is_finite())).collect())
}

fn parse_header(bytes: &[u8]) -> std::result::Result<(Header, &[u8]), String> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut kinds: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = 0usize;
    let mut height = 1usize;
    let mut points: Option<usize> = None;

    let mut pos = 0;
    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|e| pos + e)
            .unwrap_or(bytes.len());
        let line = std::str::from_utf8(&bytes[pos..end])
            .map_err(|_| "header is not valid text".to_string())?
            .trim();
        pos = (end + 1).min(bytes.len());

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default().to_ascii_uppercase();
        let values: Vec<&str> = parts.collect();
        let numbers = |what: &str| -> std::result::Result<Vec<usize>, String> {
            values
                .iter()
                .map(|v| v.parse::<usize>().map_err(|_| format!("bad {} value '{}'", what, v)))
                .collect()
        };

        match key.as_str() {
            "FIELDS" => names = values.iter().map(|s| s.to_string()).collect(),
            "SIZE" => sizes = numbers("SIZE")?,
            "TYPE" => kinds = values.iter().filter_map(|s| s.chars().next()).collect(),
            "COUNT" => counts = numbers("COUNT")?,
            "WIDTH" => width = numbers("WIDTH")?.first().copied().unwrap_or(0),
            "HEIGHT" => height = numbers("HEIGHT")?.first().copied().unwrap_or(1),
            "POINTS" => points = numbers("POINTS")?.first().copied(),
            "DATA" => {
                let data = match values.first().copied() {
                    Some("ascii") => DataKind::Ascii,
                    Some("binary") => DataKind::Binary,
                    Some("binary_compressed") => DataKind::BinaryCompressed,
                    other => return Err(format!("unknown DATA kind {:?}", other)),
                };
                if counts.is_empty() {
                    counts = vec![1; names.len()];
                }
                if names.is_empty()
                    || sizes.len() != names.len()
                    || kinds.len() != names.len()
                    || counts.len() != names.len()
                {
                    return Err("FIELDS, SIZE, TYPE and COUNT disagree in length".to_string());
                }
                if sizes.contains(&0) || counts.contains(&0) {
                    return Err("SIZE and COUNT values must be at least 1".to_string());
                }
                let stride = sizes
                    .iter()
                    .zip(&counts)
                    .try_fold(0usize, |acc, (&size, &count)| {
                        size.checked_mul(count).and_then(|b| acc.checked_add(b))
                    })
                    .ok_or_else(|| "point record size overflows".to_string())?;
                let points = match points {
                    Some(p) => p,
                    None => width
                        .checked_mul(height)
                        .ok_or_else(|| "WIDTH x HEIGHT overflows".to_string())?,
                };
                let fields = names
                    .into_iter()
                    .zip(sizes)
                    .zip(kinds)
                    .zip(counts)
                    .map(|(((name, size), kind), count)| Field {
                        name,
                        size,
                        kind,
                        count,
                    })
                    .collect();
                let header = Header {
                    fields,
                    points,
                    stride,
                    data,
                };
                return Ok((header, &bytes[pos..]));
            }
            // VERSION, VIEWPOINT and unknown keys carry nothing we need
            _ => {}
        }
    }
    Err("missing DATA line".to_string())
}

fn parse_ascii(header: &Header, body: &[u8], xyz: [usize; 3]) -> std::result::Result<Vec<[f64; 3]>, String> {
    let text = std::str::from_utf8(body).map_err(|_| "ascii body is not valid text".to_string())?;
    let cols = xyz.map(|i| header.column(i));

    // Every ascii point takes at least two bytes, whatever POINTS claims
    let mut out = Vec::with_capacity(header.points.min(body.len() / 2));
    for (row, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        if out.len() == header.points {
            break;
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        let mut p = [0.0; 3];
        for (slot, &col) in p.iter_mut().zip(cols.iter()) {
            let raw = values
                .get(col)
                .ok_or_else(|| format!("point {} has too few values", row + 1))?;
            *slot = raw
                .parse::<f64>()
                .map_err(|_| format!("point {}: bad number '{}'", row + 1, raw))?;
        }
        out.push(p);
    }
    if out.len() < header.points {
        return Err(format!("expected {} points, found {}", header.points, out.len()));
    }
    Ok(out)
}

fn read_float(bytes: &[u8], size: usize) -> f64 {
    if size == 8 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b)
    } else {
        let mut b = [0u8; 4];
        b.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(b) as f64
    }
}

fn parse_binary(header: &Header, body: &[u8], xyz: [usize; 3]) -> std::result::Result<Vec<[f64; 3]>, String> {
    let stride = header.stride;
    let needed = header
        .body_len()
        .ok_or_else(|| format!("POINTS {} is too large", header.points))?;
    if body.len() < needed {
        return Err(format!("binary body has {} bytes, expected {}", body.len(), needed));
    }
    let offsets = xyz.map(|i| (header.byte_offset(i), header.fields[i].size));

    Ok(body[..needed]
        .chunks_exact(stride)
        .map(|rec| offsets.map(|(off, size)| read_float(&rec[off..], size)))
        .collect())
}

fn parse_compressed(header: &Header, body: &[u8], xyz: [usize; 3]) -> std::result::Result<Vec<[f64; 3]>, String> {
    if body.len() < 8 {
        return Err("compressed body too short".to_string());
    }
    let compressed_size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    let raw_size = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) as usize;
    let payload = body
        .get(8..)
        .and_then(|rest| rest.get(..compressed_size))
        .ok_or_else(|| "compressed payload truncated".to_string())?;

    let needed = header
        .body_len()
        .ok_or_else(|| format!("POINTS {} is too large", header.points))?;
    let raw = lzf_decompress(payload, raw_size)?;
    if raw.len() < needed {
        return Err("decompressed data shorter than declared points".to_string());
    }

    // Field-major layout: all values of field 0, then field 1, ...
    let n = header.points;
    let starts = xyz.map(|i| {
        let start: usize = header.fields[..i].iter().map(|f| f.size * f.count * n).sum();
        (start, header.fields[i].size * header.fields[i].count, header.fields[i].size)
    });

    Ok((0..n)
        .map(|k| starts.map(|(start, step, size)| read_float(&raw[start + k * step..], size)))
        .collect())
}

/// Decompress an LZF block as written by PCL
fn lzf_decompress(input: &[u8], out_len: usize) -> std::result::Result<Vec<u8>, String> {
    // A back-reference expands to at most 264 bytes from 2-3 input bytes
    let mut out: Vec<u8> = Vec::with_capacity(out_len.min(input.len().saturating_mul(132)));
    let mut ip = 0;
    let corrupt = || "corrupt LZF stream".to_string();

    while ip < input.len() {
        let ctrl = input[ip] as usize;
        ip += 1;

        if ctrl < 32 {
            let len = ctrl + 1;
            let lit = input.get(ip..ip + len).ok_or_else(corrupt)?;
            out.extend_from_slice(lit);
            ip += len;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                len += *input.get(ip).ok_or_else(corrupt)? as usize;
                ip += 1;
            }
            let back = ((ctrl & 0x1f) << 8) + *input.get(ip).ok_or_else(corrupt)? as usize + 1;
            ip += 1;
            len += 2;

            let start = out.len().checked_sub(back).ok_or_else(corrupt)?;
            // Source and destination may overlap
            for k in 0..len {
                let b = out[start + k];
                out.push(b);
            }
        }
        if out.len() > out_len {
            return Err(corrupt());
        }
    }

    if out.len() != out_len {
        return Err(format!("LZF produced {} bytes, expected {}", out.len(), out_len));
    }
    Ok(out)
}
