//! Devices that consume drawing operations without rasterizing.

mod bbox;
mod list;
mod text;

pub use bbox::BboxDevice;
pub use list::{DisplayItem, ListDevice};
pub use text::{TextDevice, TextItem};
