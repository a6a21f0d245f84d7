//! Stream filters.
//!
//! The engine decodes stream content through named filter plugins. Two
//! filters ship built in (FlateDecode with predictor support, and
//! ASCIIHexDecode); anything else — DCT, JBIG2, CCITT, JPX, LZW — enters
//! through [`FilterRegistry::register`].

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::name::keys;
use crate::object::{Dict, Value};
use rustc_hash::FxHashMap;
use std::sync::Arc;

mod ascii_hex;
mod flate;

pub use ascii_hex::AsciiHexDecode;
pub use flate::FlateDecode;

/// A stream-transform plugin.
///
/// Takes the raw bytes, the filter's parameter dictionary and a context;
/// yields decoded bytes. Failures raise.
pub trait StreamFilter: Send + Sync {
    fn decode(&self, data: &[u8], params: &Dict, ctx: &Context) -> Result<Vec<u8>>;
}

/// Name-keyed set of available filters.
pub struct FilterRegistry {
    filters: FxHashMap<Vec<u8>, Arc<dyn StreamFilter>>,
}

impl FilterRegistry {
    /// A registry holding only the built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            filters: FxHashMap::default(),
        };

        let flate: Arc<dyn StreamFilter> = Arc::new(FlateDecode);
        registry.register(keys::FLATE_DECODE, flate.clone());
        registry.register(keys::FLATE_DECODE_ABBREVIATION, flate);

        let hex: Arc<dyn StreamFilter> = Arc::new(AsciiHexDecode);
        registry.register(keys::ASCII_HEX_DECODE, hex.clone());
        registry.register(keys::ASCII_HEX_DECODE_ABBREVIATION, hex);

        registry
    }

    /// Register (or replace) a filter under the given name.
    pub fn register(&mut self, name: &[u8], filter: Arc<dyn StreamFilter>) {
        self.filters.insert(name.to_vec(), filter);
    }

    pub fn get(&self, name: &[u8]) -> Option<Arc<dyn StreamFilter>> {
        self.filters.get(name).cloned()
    }
}

/// Run the stream's filter chain as described by its dictionary.
///
/// `Filter` may be a single name or an array of names, with `DecodeParms`
/// a matching dictionary or array of dictionaries.
pub fn decode_with_chain(
    data: &[u8],
    stream_dict: &Dict,
    registry: &FilterRegistry,
    ctx: &Context,
) -> Result<Vec<u8>> {
    let filter = stream_dict.get(keys::FILTER);
    let parms = stream_dict.get(keys::DECODE_PARMS);

    let (names, all_parms): (Vec<Value>, Vec<Value>) = match &filter {
        Value::Null => return Ok(data.to_vec()),
        Value::Name(_) => (vec![filter.clone()], vec![parms.clone()]),
        Value::Array(a) => {
            let names = a.snapshot().iter().map(|v| v.resolve()).collect();
            let parms = match &parms {
                Value::Array(p) => p.snapshot().iter().map(|v| v.resolve()).collect(),
                _ => vec![],
            };
            (names, parms)
        }
        other => {
            return Err(Error::filter(format!(
                "stream filter entry has kind {}",
                other.kind()
            )))
        }
    };

    let mut current = data.to_vec();

    for (i, name_value) in names.iter().enumerate() {
        let name = name_value.as_name();

        let Some(filter) = registry.get(&name) else {
            return Err(Error::filter(format!(
                "no filter registered for {}",
                name.as_str()
            )));
        };

        let params = all_parms
            .get(i)
            .and_then(|v| v.as_dict())
            .unwrap_or_default();

        current = filter.decode(&current, &params, ctx)?;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Name;

    #[test]
    fn unknown_filter_raises() {
        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();

        let dict = Dict::new(1);
        dict.put_key(keys::FILTER, Value::Name(Name::new(b"JPXDecode")));

        assert!(decode_with_chain(b"x", &dict, &registry, &ctx).is_err());
    }

    #[test]
    fn missing_filter_passes_through() {
        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();

        let dict = Dict::new(0);
        let out = decode_with_chain(b"abc", &dict, &registry, &ctx).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn chained_filters_apply_in_order() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"payload").unwrap();
        let compressed = enc.finish().unwrap();

        let mut hex: Vec<u8> = compressed
            .iter()
            .flat_map(|b| format!("{b:02X}").into_bytes())
            .collect();
        hex.push(b'>');

        let names = crate::object::Array::from_vec(vec![
            Value::Name(Name::new(keys::ASCII_HEX_DECODE)),
            Value::Name(Name::new(keys::FLATE_DECODE)),
        ]);

        let dict = Dict::new(1);
        dict.put_key(keys::FILTER, Value::Array(names));

        let registry = FilterRegistry::with_builtins();
        let ctx = Context::new();
        let out = decode_with_chain(&hex, &dict, &registry, &ctx).unwrap();
        assert_eq!(out, b"payload");
    }
}
