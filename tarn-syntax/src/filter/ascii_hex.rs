//! ASCIIHexDecode.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::filter::StreamFilter;
use crate::object::Dict;
use crate::reader::is_white_space;

pub struct AsciiHexDecode;

impl StreamFilter for AsciiHexDecode {
    fn decode(&self, data: &[u8], _params: &Dict, _ctx: &Context) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2);
        let mut pending: Option<u8> = None;

        for &b in data {
            if b == b'>' {
                break;
            }

            if is_white_space(b) {
                continue;
            }

            let digit = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(Error::filter(format!("invalid hex byte {b:#04x}"))),
            };

            match pending.take() {
                Some(hi) => out.push(hi * 16 + digit),
                None => pending = Some(digit),
            }
        }

        // An odd trailing digit is padded with zero.
        if let Some(hi) = pending {
            out.push(hi * 16);
        }

        Ok(out)
    }
}
