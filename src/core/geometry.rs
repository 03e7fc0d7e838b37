use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounds half away from zero and saturates into `i32`.
#[inline]
fn round_to_i32(value: f64) -> i32 {
    value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Size({}x{})", self.width, self.height)
    }
}

/// Integer rectangle. Dirty rects and popup bounds from the engine are in
/// physical pixels; view geometry from the host is in logical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.right() <= self.right()
            && other.y >= self.y
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !(other.x >= self.right()
            || other.right() <= self.x
            || other.y >= self.bottom()
            || other.bottom() <= self.y)
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        if !self.intersects(other) {
            return Rect::default();
        }

        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        Rect::new(left, top, right - left, bottom - top)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        Rect::new(left, top, right - left, bottom - top)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Device scale factor (1.0 = standard density, 2.0 = HiDPI).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScaleFactor(pub f32);

impl Default for ScaleFactor {
    fn default() -> Self {
        Self(1.0)
    }
}

impl ScaleFactor {
    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn scale(&self, value: i32) -> i32 {
        round_to_i32(value as f64 * self.0 as f64)
    }

    /// Returns 0 for a zero factor instead of dividing by zero.
    pub fn unscale(&self, value: i32) -> i32 {
        if self.0 == 0.0 {
            return 0;
        }
        round_to_i32(value as f64 / self.0 as f64)
    }

    pub fn scale_point(&self, point: Point) -> Point {
        Point::new(self.scale(point.x), self.scale(point.y))
    }

    pub fn unscale_point(&self, point: Point) -> Point {
        Point::new(self.unscale(point.x), self.unscale(point.y))
    }

    pub fn scale_size(&self, size: Size) -> Size {
        Size::new(self.scale(size.width), self.scale(size.height))
    }

    pub fn unscale_size(&self, size: Size) -> Size {
        Size::new(self.unscale(size.width), self.unscale(size.height))
    }

    pub fn scale_rect(&self, rect: Rect) -> Rect {
        Rect::new(
            self.scale(rect.x),
            self.scale(rect.y),
            self.scale(rect.width),
            self.scale(rect.height),
        )
    }

    pub fn unscale_rect(&self, rect: Rect) -> Rect {
        Rect::new(
            self.unscale(rect.x),
            self.unscale(rect.y),
            self.unscale(rect.width),
            self.unscale(rect.height),
        )
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScaleFactor({})", self.0)
    }
}
