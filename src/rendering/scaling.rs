//! Logical/physical coordinate transforms for HiDPI displays.
//!
//! Logical coordinates are what the host widget reports (800x600); physical
//! coordinates are what the engine paints at (1600x1200 at 2x).

use crate::core::{Point, Rect, ScaleFactor, Size};
use parking_lot::Mutex;

/// Thread-safe holder of the current device scale factor.
///
/// All transforms round to the nearest integer (half away from zero), so a
/// logical -> physical -> logical round trip may be off by one unit per
/// dimension when the input is not a multiple consistent with the factor.
#[derive(Debug, Default)]
pub struct ScalingManager {
    scale: Mutex<ScaleFactor>,
}

impl ScalingManager {
    pub fn new(scale: f32) -> Self {
        Self {
            scale: Mutex::new(ScaleFactor(scale)),
        }
    }

    pub fn scale_factor(&self) -> ScaleFactor {
        *self.scale.lock()
    }

    pub fn scale_value(&self) -> f32 {
        self.scale.lock().value()
    }

    pub fn set_scale_factor(&self, scale: f32) {
        *self.scale.lock() = ScaleFactor(scale);
    }

    pub fn is_scaling_enabled(&self) -> bool {
        self.scale.lock().value() != 1.0
    }

    pub fn logical_to_physical_point(&self, logical: Point) -> Point {
        self.scale.lock().scale_point(logical)
    }

    pub fn physical_to_logical_point(&self, physical: Point) -> Point {
        self.scale.lock().unscale_point(physical)
    }

    pub fn logical_to_physical_size(&self, logical: Size) -> Size {
        self.scale.lock().scale_size(logical)
    }

    pub fn physical_to_logical_size(&self, physical: Size) -> Size {
        self.scale.lock().unscale_size(physical)
    }

    pub fn logical_to_physical_rect(&self, logical: Rect) -> Rect {
        self.scale.lock().scale_rect(logical)
    }

    pub fn physical_to_logical_rect(&self, physical: Rect) -> Rect {
        self.scale.lock().unscale_rect(physical)
    }

    pub fn scale_value_of(&self, value: i32) -> i32 {
        self.scale.lock().scale(value)
    }

    /// Returns 0 when the factor is 0.
    pub fn unscale_value_of(&self, value: i32) -> i32 {
        self.scale.lock().unscale(value)
    }
}

impl Clone for ScalingManager {
    fn clone(&self) -> Self {
        Self {
            scale: Mutex::new(self.scale_factor()),
        }
    }
}
