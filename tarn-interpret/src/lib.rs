/*!
Content-stream interpretation for tarn.

This crate walks a page's content stream, maintains the graphics state, and
drives a [`Device`]: the consumer interface every renderer implements. The
devices shipped here do not rasterize — [`devices::BboxDevice`] measures,
[`devices::ListDevice`] records for replay, [`devices::TextDevice`] extracts
characters. The actual rasterizer lives in `tarn-render`.

It also decodes PDF functions and the seven shading types into the mesh and
lookup-table form the draw device consumes.
*/

pub mod color;
pub mod content;
pub mod cookie;
pub mod device;
pub mod devices;
pub mod font;
pub mod function;
pub mod image;
pub mod shading;
pub mod state;

pub use color::{Color, ColorSpace};
pub use content::{run_content, run_page};
pub use cookie::Cookie;
pub use device::{BlendMode, ClipAccumulate, Device, FillRule, Glyph, StrokeState, TextSpan};
pub use font::Font;
pub use image::{Image, ImageData};
pub use shading::Shading;
