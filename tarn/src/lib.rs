/*!
Render PDF pages to pixmaps.

This crate ties the layers together: `tarn-syntax` opens the document and
resolves objects, `tarn-interpret` walks page content, `tarn-render`
rasterizes. The API here is the short path from bytes to pixels:

```no_run
use std::sync::Arc;

let data = std::fs::read("file.pdf").unwrap();
let doc = tarn::Document::open(Arc::new(data)).unwrap();

for index in 0..doc.count_pages() {
    let png = tarn::render_page_to_png(&doc, index, &tarn::RenderOptions::default()).unwrap();
    std::fs::write(format!("page{index}.png"), png).unwrap();
}
```
*/

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use kurbo::Affine;
use tarn_interpret::{run_page, Cookie};
use tarn_render::{DrawDevice, PixFormat, Pixmap};
use tarn_syntax::error::Error;
use tarn_syntax::geom::IRect;
use std::sync::Arc;

pub use tarn_interpret as interpret;
pub use tarn_render as render;
pub use tarn_syntax as syntax;

pub use tarn_syntax::{Document, Result};

/// How a page is turned into pixels.
pub struct RenderOptions {
    /// Uniform scale; 1.0 maps one PDF unit to one pixel.
    pub scale: f32,
    /// Background the page is composited over. White by default; `None`
    /// leaves the pixmap transparent.
    pub background: Option<[u8; 3]>,
    /// Observation and cancellation.
    pub cookie: Option<Arc<Cookie>>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            background: Some([255, 255, 255]),
            cookie: None,
        }
    }
}

/// Render one page into an RGBA pixmap.
pub fn render_page(doc: &Document, index: usize, options: &RenderOptions) -> Result<Pixmap> {
    let Some(page) = doc.page(index) else {
        return Err(Error::missing_resource(format!("page {index}")));
    };

    let media = page.media_box();
    let scale = options.scale.max(0.001) as f64;

    let page_w = media.width() * scale;
    let page_h = media.height() * scale;

    // User space is y-up; the pixmap is y-down with its origin at the
    // page's top-left.
    let base = Affine::new([
        scale,
        0.0,
        0.0,
        -scale,
        -media.x0 * scale,
        media.y1 * scale,
    ]);

    let (ctm, width, height) = match page.rotate() {
        90 => (
            Affine::new([0.0, 1.0, -1.0, 0.0, page_h, 0.0]) * base,
            page_h,
            page_w,
        ),
        180 => (
            Affine::new([-1.0, 0.0, 0.0, -1.0, page_w, page_h]) * base,
            page_w,
            page_h,
        ),
        270 => (
            Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, page_w]) * base,
            page_h,
            page_w,
        ),
        _ => (base, page_w, page_h),
    };

    let bbox = IRect::new(0, 0, width.ceil().max(1.0) as i32, height.ceil().max(1.0) as i32);
    let mut dest = Pixmap::new(bbox, PixFormat::Rgb);

    if let Some([r, g, b]) = options.background {
        for px in dest.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[r, g, b, 255]);
        }
    }

    let mut device = DrawDevice::new(dest);
    if let Some(cookie) = &options.cookie {
        device = device.with_cookie(cookie.clone());
    }

    run_page(doc, &page, &mut device, ctm, options.cookie.as_deref())?;

    Ok(device.into_pixmap())
}

/// Render one page and encode it as PNG.
pub fn render_page_to_png(
    doc: &Document,
    index: usize,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    let pixmap = render_page(doc, index, options)?;
    let rgba = pixmap.to_rgba8();

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&rgba, pixmap.w, pixmap.h, ExtendedColorType::Rgba8)
        .map_err(|e| Error::parse(format!("PNG encoding failed: {e}")))?;

    Ok(png)
}
