use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::bayer::{CellSize, MatrixNormalization};

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CONTRAST: f32 = 1.2;
pub const DEFAULT_GRAIN: f32 = 0.05;

/// Tuning for one renderer instance. Fixed for the lifetime of that instance.
///
/// Values outside the nominal ranges are accepted: the clamps inside the
/// shading step already bound the output, so extreme thresholds simply yield
/// all-black or all-white frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DitherParams {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    #[serde(default = "default_grain")]
    pub grain: f32,
    #[serde(default)]
    pub cell_size: CellSize,
    #[serde(default)]
    pub normalization: MatrixNormalization,
}

impl Default for DitherParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            contrast: DEFAULT_CONTRAST,
            grain: DEFAULT_GRAIN,
            cell_size: CellSize::default(),
            normalization: MatrixNormalization::default(),
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_contrast() -> f32 {
    DEFAULT_CONTRAST
}

fn default_grain() -> f32 {
    DEFAULT_GRAIN
}

impl DitherParams {
    pub fn to_gpu(&self) -> GpuDitherParams {
        GpuDitherParams {
            threshold: self.threshold,
            contrast: self.contrast,
            grain: self.grain,
            cell_size: self.cell_size.side(),
            normalization: self.normalization.as_u32(),
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        }
    }
}

/// Matches `DitherParams` in dither.wgsl. 32 bytes (two vec4-sized rows).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuDitherParams {
    pub threshold: f32,
    pub contrast: f32,
    pub grain: f32,
    pub cell_size: u32,
    pub normalization: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}
