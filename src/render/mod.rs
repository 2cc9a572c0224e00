pub mod curve;
pub mod raster;
pub mod terminal;

pub use curve::{decimate, render_curve, CurveStyle, DrawCommand, PathSegment, Point};
pub use raster::{Canvas, Rgb};
pub use terminal::TerminalSurface;
