//! Integer boxes and the rectangle conventions used by the engine.

use kurbo::{Affine, Point, Rect};

/// A rectangle is empty iff either axis has zero extent.
#[inline]
pub fn rect_is_empty(r: &Rect) -> bool {
    r.x0 == r.x1 || r.y0 == r.y1
}

/// A rectangle is infinite iff its coordinates are reversed on either axis.
#[inline]
pub fn rect_is_infinite(r: &Rect) -> bool {
    r.x0 > r.x1 || r.y0 > r.y1
}

/// The canonical infinite rectangle.
pub const INFINITE_RECT: Rect = Rect {
    x0: 1.0,
    y0: 1.0,
    x1: -1.0,
    y1: -1.0,
};

/// Transform a rectangle, mapping infinite to infinite.
pub fn transform_rect(m: Affine, r: &Rect) -> Rect {
    if rect_is_infinite(r) {
        return *r;
    }

    m.transform_rect_bbox(*r)
}

/// The geometric mean expansion factor of a matrix, used to scale
/// flatness and line-width thresholds.
pub fn expansion(m: Affine) -> f64 {
    let [a, b, c, d, _, _] = m.as_coeffs();
    (a * d - b * c).abs().sqrt()
}

/// An integer device-space box, `x0/y0` inclusive, `x1/y1` exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl IRect {
    pub const EMPTY: IRect = IRect {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    /// The box covering everything.
    pub const INFINITE: IRect = IRect {
        x0: i32::MIN,
        y0: i32::MIN,
        x1: i32::MAX,
        y1: i32::MAX,
    };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// The smallest integer box covering `r`: top-left floors, bottom-right
    /// ceils, clamped to the `i32` range.
    pub fn covering(r: &Rect) -> Self {
        if rect_is_infinite(r) {
            return Self::INFINITE;
        }

        let clamp = |v: f64| v.clamp(i32::MIN as f64, i32::MAX as f64);

        Self {
            x0: clamp(r.x0.floor()) as i32,
            y0: clamp(r.y0.floor()) as i32,
            x1: clamp(r.x1.ceil()) as i32,
            y1: clamp(r.y1.ceil()) as i32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn width(&self) -> i32 {
        (self.x1 - self.x0).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y1 - self.y0).max(0)
    }

    pub fn intersect(&self, other: &IRect) -> IRect {
        let r = IRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };

        if r.is_empty() {
            IRect {
                x1: r.x0,
                y1: r.y0,
                ..r
            }
        } else {
            r
        }
    }

    pub fn union(&self, other: &IRect) -> IRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        IRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> IRect {
        IRect {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x0 as f64, self.y0 as f64, self.x1 as f64, self.y1 as f64)
    }
}

/// Normalize a rectangle read from file so x0 ≤ x1 and y0 ≤ y1.
pub fn normalize_rect(r: &Rect) -> Rect {
    Rect::new(
        r.x0.min(r.x1),
        r.y0.min(r.y1),
        r.x0.max(r.x1),
        r.y0.max(r.y1),
    )
}

/// Transform a point by a matrix.
#[inline]
pub fn transform_point(m: Affine, p: Point) -> Point {
    m * p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covering_rounds_outward() {
        let b = IRect::covering(&Rect::new(0.2, 0.7, 3.1, 4.0));
        assert_eq!(b, IRect::new(0, 0, 4, 4));

        let b = IRect::covering(&Rect::new(-0.2, -3.7, -0.1, -1.2));
        assert_eq!(b, IRect::new(-1, -4, 0, -1));
    }

    #[test]
    fn empty_preserved_by_nondegenerate_transform() {
        let empty = Rect::new(5.0, 5.0, 5.0, 9.0);
        assert!(rect_is_empty(&empty));

        let m = Affine::new([2.0, 0.0, 0.0, 3.0, 1.0, 1.0]);
        let t = transform_rect(m, &empty);
        assert!(rect_is_empty(&t));

        let solid = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert!(!rect_is_empty(&transform_rect(m, &solid)));
    }

    #[test]
    fn infinite_rect_convention() {
        assert!(rect_is_infinite(&INFINITE_RECT));
        assert!(!rect_is_infinite(&Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(IRect::covering(&INFINITE_RECT), IRect::INFINITE);
    }

    #[test]
    fn intersect_clamps_to_empty() {
        let a = IRect::new(0, 0, 10, 10);
        let b = IRect::new(20, 20, 30, 30);
        assert!(a.intersect(&b).is_empty());

        let c = IRect::new(5, 5, 15, 15);
        assert_eq!(a.intersect(&c), IRect::new(5, 5, 10, 10));
    }
}
