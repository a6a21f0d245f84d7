//! Pixel buffers with a device-space origin.

use tarn_syntax::geom::IRect;

/// The channel layouts the rasterizer composites in. All colour data is
/// premultiplied by its alpha channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixFormat {
    /// A single coverage/alpha channel.
    Alpha,
    /// Gray plus alpha.
    Gray,
    /// RGB plus alpha.
    Rgb,
}

impl PixFormat {
    /// Bytes per pixel, alpha included.
    pub fn n(&self) -> usize {
        match self {
            PixFormat::Alpha => 1,
            PixFormat::Gray => 2,
            PixFormat::Rgb => 4,
        }
    }
}

/// A rectangular pixel array positioned in device space.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub format: PixFormat,
    data: Vec<u8>,
}

impl Pixmap {
    /// A zero-filled pixmap covering `bbox`.
    pub fn new(bbox: IRect, format: PixFormat) -> Self {
        let w = bbox.width().max(0) as u32;
        let h = bbox.height().max(0) as u32;

        Self {
            x: bbox.x0,
            y: bbox.y0,
            w,
            h,
            format,
            data: vec![0; w as usize * h as usize * format.n()],
        }
    }

    pub fn bbox(&self) -> IRect {
        IRect::new(
            self.x,
            self.y,
            self.x + self.w as i32,
            self.y + self.h as i32,
        )
    }

    pub fn n(&self) -> usize {
        self.format.n()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of the pixel at device coordinates (x, y).
    #[inline]
    pub fn offset_of(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bbox().contains(x, y) {
            return None;
        }

        let ix = (x - self.x) as usize;
        let iy = (y - self.y) as usize;

        Some((iy * self.w as usize + ix) * self.n())
    }

    /// A whole row inside the pixmap, clipped to its width.
    #[inline]
    pub fn row_mut(&mut self, y: i32) -> Option<&mut [u8]> {
        if y < self.y || y >= self.y + self.h as i32 {
            return None;
        }

        let n = self.n();
        let iy = (y - self.y) as usize;
        let stride = self.w as usize * n;

        Some(&mut self.data[iy * stride..(iy + 1) * stride])
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fill every channel with `value` (a "solid" clear; used for
    /// luminosity mask backdrops).
    pub fn clear_with(&mut self, value: u8) {
        match self.format {
            PixFormat::Alpha => self.data.fill(value),
            _ => {
                let n = self.n();
                for px in self.data.chunks_exact_mut(n) {
                    for c in px[..n - 1].iter_mut() {
                        *c = value;
                    }
                    px[n - 1] = 255;
                }
            }
        }
    }

    /// Copy the pixels of `src` that fall inside `bbox` into this pixmap.
    /// Both pixmaps must share a format.
    pub fn copy_rect(&mut self, src: &Pixmap, bbox: IRect) {
        debug_assert_eq!(self.format, src.format);

        let region = bbox.intersect(&self.bbox()).intersect(&src.bbox());
        let n = self.n();

        for y in region.y0..region.y1 {
            let width = region.width() as usize * n;

            let (Some(dst_off), Some(src_off)) =
                (self.offset_of(region.x0, y), src.offset_of(region.x0, y))
            else {
                continue;
            };

            let src_row = &src.data[src_off..src_off + width];
            self.data[dst_off..dst_off + width].copy_from_slice(src_row);
        }
    }

    /// Extract an alpha mask from a gray pixmap.
    ///
    /// With `luminosity` set the gray value becomes the mask (the soft-mask
    /// luminosity semantics); otherwise the alpha channel is used directly.
    pub fn alpha_from_gray(&self, luminosity: bool) -> Pixmap {
        debug_assert_eq!(self.format, PixFormat::Gray);

        let mut out = Pixmap::new(self.bbox(), PixFormat::Alpha);

        for (dst, px) in out.data.iter_mut().zip(self.data.chunks_exact(2)) {
            *dst = if luminosity { px[0] } else { px[1] };
        }

        out
    }

    /// Unpremultiplied RGBA8 copy, for output.
    pub fn to_rgba8(&self) -> Vec<u8> {
        debug_assert_eq!(self.format, PixFormat::Rgb);

        let mut out = Vec::with_capacity(self.w as usize * self.h as usize * 4);

        for px in bytemuck::cast_slice::<u8, [u8; 4]>(&self.data) {
            let a = px[3];
            if a == 0 || a == 255 {
                out.extend_from_slice(px);
            } else {
                let un = |c: u8| ((c as u32 * 255 + (a as u32 / 2)) / a as u32).min(255) as u8;
                out.extend_from_slice(&[un(px[0]), un(px[1]), un(px[2]), a]);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_respect_origin() {
        let pix = Pixmap::new(IRect::new(10, 20, 14, 24), PixFormat::Rgb);
        assert_eq!(pix.offset_of(10, 20), Some(0));
        assert_eq!(pix.offset_of(11, 20), Some(4));
        assert_eq!(pix.offset_of(10, 21), Some(16));
        assert_eq!(pix.offset_of(9, 20), None);
        assert_eq!(pix.offset_of(14, 20), None);
    }

    #[test]
    fn copy_rect_copies_the_overlap() {
        let mut dst = Pixmap::new(IRect::new(0, 0, 4, 4), PixFormat::Alpha);
        let mut src = Pixmap::new(IRect::new(2, 2, 6, 6), PixFormat::Alpha);
        src.data_mut().fill(9);

        dst.copy_rect(&src, IRect::new(0, 0, 6, 6));

        assert_eq!(dst.offset_of(3, 3).map(|o| dst.data()[o]), Some(9));
        assert_eq!(dst.offset_of(1, 1).map(|o| dst.data()[o]), Some(0));
    }

    #[test]
    fn luminosity_mask_takes_gray_value() {
        let mut gray = Pixmap::new(IRect::new(0, 0, 2, 1), PixFormat::Gray);
        gray.data_mut().copy_from_slice(&[100, 255, 0, 50]);

        let lum = gray.alpha_from_gray(true);
        assert_eq!(lum.data(), &[100, 0]);

        let alpha = gray.alpha_from_gray(false);
        assert_eq!(alpha.data(), &[255, 50]);
    }
}
