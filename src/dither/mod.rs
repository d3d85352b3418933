//! Monochrome ordered-dither renderer with animated grain.
//!
//! Per pixel: BT.601 luma, contrast around 0.5, compare against a Bayer
//! threshold indexed by screen position, add time-driven simplex grain, clamp
//! and emit black or white. [`cpu`] and [`gpu`] implement the same shading;
//! [`renderer::DitherRenderer`] drives either one per image instance.

pub mod bayer;
pub mod clock;
pub mod cpu;
pub mod fit;
pub mod gpu;
pub mod noise;
pub mod params;
pub mod renderer;
pub mod shade;
pub mod source;

pub use bayer::{CellSize, MatrixNormalization};
pub use params::DitherParams;
pub use renderer::{Backend, DitherRenderer, Frame, RendererOptions};
pub use source::{ImageSource, SourceState};
