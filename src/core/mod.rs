//! Value types shared by the rendering pipeline and the browser host layer.

pub mod geometry;

pub use geometry::*;
