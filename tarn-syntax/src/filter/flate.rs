//! FlateDecode, with PNG and TIFF predictors.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::filter::StreamFilter;
use crate::object::name::keys;
use crate::object::Dict;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

pub struct FlateDecode;

impl StreamFilter for FlateDecode {
    fn decode(&self, data: &[u8], params: &Dict, _ctx: &Context) -> Result<Vec<u8>> {
        let inflated = inflate(data)?;

        let predictor = params.get(keys::PREDICTOR).as_int();
        if predictor <= 1 {
            return Ok(inflated);
        }

        let colors = params.get(b"Colors").as_int();
        let colors = if colors > 0 { colors } else { 1 } as usize;
        let bpc = {
            let v = params.get(b"BitsPerComponent").as_int();
            if v > 0 {
                v as usize
            } else {
                8
            }
        };
        let columns = {
            let v = params.get(keys::COLUMNS).as_int();
            if v > 0 {
                v as usize
            } else {
                1
            }
        };

        apply_predictor(&inflated, predictor, colors, bpc, columns)
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    if ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    // Some producers write raw deflate without the zlib wrapper.
    out.clear();
    match DeflateDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(e) => Err(Error::filter(format!("flate decode failed: {e}"))),
    }
}

fn apply_predictor(
    data: &[u8],
    predictor: i32,
    colors: usize,
    bpc: usize,
    columns: usize,
) -> Result<Vec<u8>> {
    let bpp = (colors * bpc).div_ceil(8).max(1);
    let row_len = (columns * colors * bpc).div_ceil(8);

    if predictor == 2 {
        // TIFF horizontal differencing. Only the byte-aligned case matters
        // in practice.
        if bpc != 8 {
            return Err(Error::filter(format!(
                "TIFF predictor with {bpc} bits per component is unsupported"
            )));
        }

        let mut out = data.to_vec();
        for row in out.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(out);
    }

    // PNG predictors: every row is prefixed with its filter type.
    let mut out = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < 2 {
            break;
        }

        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);

        match filter {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as i16 } else { 0 };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bpp { prev_row[i - bpp] as i16 } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(Error::filter(format!("unknown PNG predictor row type {other}")));
            }
        }

        out.extend_from_slice(&row);
        prev_row = row;
    }

    Ok(out)
}

fn paeth(a: i16, b: i16, c: i16) -> u8 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn plain_roundtrip() {
        let ctx = Context::new();
        let out = FlateDecode
            .decode(&deflate(b"hello flate"), &Dict::new(0), &ctx)
            .unwrap();
        assert_eq!(out, b"hello flate");
    }

    #[test]
    fn png_up_predictor() {
        // Two rows of four bytes, filter type 2 (up).
        let raw = [
            0u8, 1, 2, 3, 4, // row 0: up against implicit zero row
            2, 1, 1, 1, 1, // row 1: each byte adds the byte above
        ];

        let params = Dict::new(2);
        params.put_key(b"Predictor", Value::Int(12));
        params.put_key(b"Columns", Value::Int(4));

        let ctx = Context::new();
        let out = FlateDecode.decode(&deflate(&raw), &params, &ctx).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 2, 3, 4, 5]);
    }

    #[test]
    fn raw_deflate_fallback() {
        use flate2::write::DeflateEncoder;

        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"raw stream").unwrap();
        let data = enc.finish().unwrap();

        let ctx = Context::new();
        let out = FlateDecode.decode(&data, &Dict::new(0), &ctx).unwrap();
        assert_eq!(out, b"raw stream");
    }
}
