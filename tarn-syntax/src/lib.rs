/*!
A low-level library for reading PDF files.

This crate implements the syntax layer of a PDF engine: locating and
validating the cross-reference table, lazily resolving numbered objects, the
dynamic object model, stream filters and the standard security handler. It
knows nothing about rendering; higher layers drive it through [`Document`].

The parser is deliberately forgiving. Structural damage (a broken or missing
xref, truncated subsections, objects at wrong offsets) is answered by a
repair pass that rebuilds the index from the raw bytes, so that a document
only fails to open when there is truly nothing left to read.

# Example
```no_run
use std::sync::Arc;
use tarn_syntax::Document;

let data = std::fs::read("file.pdf").unwrap();
let doc = Document::open(Arc::new(data)).unwrap();

for i in 0..doc.count_pages() {
    let page = doc.page(i).unwrap();
    println!("page {i}: {:?}", page.media_box());
}
```
*/

use std::sync::Arc;

pub mod bit;
pub mod content;
pub mod context;
pub mod crypt;
pub mod document;
pub mod error;
pub mod filter;
pub mod geom;
pub(crate) mod ocg;
pub mod object;
pub mod outline;
pub mod page;
pub mod reader;
pub mod store;
pub mod sync;
pub mod xref;

pub use context::Context;
pub use document::Document;
pub use error::{Error, Result};

/// A container for the bytes of a PDF file.
pub type PdfData = Arc<dyn AsRef<[u8]> + Send + Sync>;
