//! Interned name objects.

use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

static INTERNER: Lazy<Mutex<FxHashSet<Arc<[u8]>>>> =
    Lazy::new(|| Mutex::new(FxHashSet::default()));

/// An interned identifier.
///
/// Equal names share their backing allocation, so comparison is a pointer
/// check in the common case with a bytewise fallback.
#[derive(Clone, Eq)]
pub struct Name(Arc<[u8]>);

impl Name {
    /// Intern the given (already unescaped) bytes.
    pub fn new(bytes: &[u8]) -> Self {
        let mut interner = INTERNER.lock().unwrap();

        if let Some(existing) = interner.get(bytes) {
            return Self(existing.clone());
        }

        let arc: Arc<[u8]> = bytes.into();
        interner.insert(arc.clone());

        Self(arc)
    }

    pub fn empty() -> Self {
        Self::new(b"")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The name as UTF-8, lossy.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl PartialEq<[u8]> for Name {
    fn eq(&self, other: &[u8]) -> bool {
        *self.0 == *other
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Deref for Name {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

/// Dictionary keys used by the engine.
#[allow(missing_docs)]
pub mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &[u8] = $e;
        };
    }

    key!(ASCII_HEX_DECODE, b"ASCIIHexDecode");
    key!(ASCII_HEX_DECODE_ABBREVIATION, b"AHx");
    key!(BACKGROUND, b"Background");
    key!(BBOX, b"BBox");
    key!(BITS_PER_COMPONENT, b"BitsPerComponent");
    key!(BITS_PER_COORDINATE, b"BitsPerCoordinate");
    key!(BITS_PER_FLAG, b"BitsPerFlag");
    key!(BITS_PER_SAMPLE, b"BitsPerSample");
    key!(BM, b"BM");
    key!(BOUNDS, b"Bounds");
    key!(C0, b"C0");
    key!(C1, b"C1");
    key!(CA, b"CA");
    key!(CA_NS, b"ca");
    key!(CATALOG, b"Catalog");
    key!(COLORSPACE, b"ColorSpace");
    key!(COLUMNS, b"Columns");
    key!(CONTENTS, b"Contents");
    key!(COORDS, b"Coords");
    key!(COUNT, b"Count");
    key!(CREATOR, b"Creator");
    key!(CROP_BOX, b"CropBox");
    key!(D, b"D");
    key!(DECODE, b"Decode");
    key!(DECODE_PARMS, b"DecodeParms");
    key!(DEST, b"Dest");
    key!(DEVICE_CMYK, b"DeviceCMYK");
    key!(DEVICE_GRAY, b"DeviceGray");
    key!(DEVICE_RGB, b"DeviceRGB");
    key!(DOMAIN, b"Domain");
    key!(ENCODE, b"Encode");
    key!(ENCRYPT, b"Encrypt");
    key!(ENCRYPT_META_DATA, b"EncryptMetadata");
    key!(EXT_G_STATE, b"ExtGState");
    key!(EXTEND, b"Extend");
    key!(F, b"F");
    key!(FILTER, b"Filter");
    key!(FIRST, b"First");
    key!(FLATE_DECODE, b"FlateDecode");
    key!(FLATE_DECODE_ABBREVIATION, b"Fl");
    key!(FONT, b"Font");
    key!(FORM, b"Form");
    key!(FUNCTION, b"Function");
    key!(FUNCTIONS, b"Functions");
    key!(FUNCTION_TYPE, b"FunctionType");
    key!(GROUP, b"Group");
    key!(HEIGHT, b"Height");
    key!(I, b"I");
    key!(ID, b"ID");
    key!(IMAGE, b"Image");
    key!(IMAGE_MASK, b"ImageMask");
    key!(INDEX, b"Index");
    key!(INFO, b"Info");
    key!(INTERPOLATE, b"Interpolate");
    key!(K, b"K");
    key!(KIDS, b"Kids");
    key!(LENGTH, b"Length");
    key!(LUMINOSITY, b"Luminosity");
    key!(MATRIX, b"Matrix");
    key!(MEDIA_BOX, b"MediaBox");
    key!(N, b"N");
    key!(NEXT, b"Next");
    key!(O, b"O");
    key!(ORDER, b"Order");
    key!(OUTLINES, b"Outlines");
    key!(P, b"P");
    key!(PAGE, b"Page");
    key!(PAGES, b"Pages");
    key!(PAINT_TYPE, b"PaintType");
    key!(PATTERN, b"Pattern");
    key!(PATTERN_TYPE, b"PatternType");
    key!(PREDICTOR, b"Predictor");
    key!(PREV, b"Prev");
    key!(PRODUCER, b"Producer");
    key!(R, b"R");
    key!(RANGE, b"Range");
    key!(RESOURCES, b"Resources");
    key!(ROOT, b"Root");
    key!(ROTATE, b"Rotate");
    key!(S, b"S");
    key!(SHADING, b"Shading");
    key!(SHADING_TYPE, b"ShadingType");
    key!(SIZE, b"Size");
    key!(SMASK, b"SMask");
    key!(STM_F, b"StmF");
    key!(STR_F, b"StrF");
    key!(SUBTYPE, b"Subtype");
    key!(TITLE, b"Title");
    key!(TYPE, b"Type");
    key!(U, b"U");
    key!(V, b"V");
    key!(VERTICES_PER_ROW, b"VerticesPerRow");
    key!(W, b"W");
    key!(WIDTH, b"Width");
    key!(X_OBJECT, b"XObject");
    key!(X_STEP, b"XStep");
    key!(XREF_STM, b"XRefStm");
    key!(Y_STEP, b"YStep");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_storage() {
        let a = Name::new(b"MediaBox");
        let b = Name::new(b"MediaBox");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn comparison_is_bytewise() {
        assert_ne!(Name::new(b"A"), Name::new(b"B"));
        assert_eq!(Name::new(b"Type"), *b"Type".as_ref());
    }
}
