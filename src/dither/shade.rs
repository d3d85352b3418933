//! Per-pixel dither shading. This is the CPU twin of `fs_main` in dither.wgsl;
//! any change here must be mirrored there.

use super::bayer;
use super::noise;
use super::params::DitherParams;

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// ITU-R BT.601 luma of a normalized RGB triple.
pub fn luma(rgb: [f32; 3]) -> f32 {
    LUMA_R * rgb[0] + LUMA_G * rgb[1] + LUMA_B * rgb[2]
}

pub fn apply_contrast(gray: f32, contrast: f32) -> f32 {
    ((gray - 0.5) * contrast + 0.5).clamp(0.0, 1.0)
}

/// Threshold shifted by the matrix offset `m` of the current cell position.
pub fn effective_threshold(threshold: f32, m: f32) -> f32 {
    threshold + (m - 0.5) * 0.5
}

/// Binary ordered-dither decision for an already contrast-adjusted gray.
pub fn ordered_step(gray: f32, x: u32, y: u32, params: &DitherParams) -> f32 {
    let m = bayer::lookup(params.cell_size, x, y, params.normalization);
    if gray >= effective_threshold(params.threshold, m) {
        1.0
    } else {
        0.0
    }
}

/// Signed grain offset for screen pixel `(x, y)` at `elapsed` seconds.
pub fn grain_offset(x: u32, y: u32, elapsed: f32, grain: f32) -> f32 {
    if grain == 0.0 {
        return 0.0;
    }
    noise::grain_field(x as f32 + 0.5, y as f32 + 0.5, elapsed) * grain
}

/// Shade the screen pixel `(x, y)` for a sampled source color at `elapsed` seconds.
///
/// Returns exactly `0.0` or `1.0`. Grain shifts the gray level before the
/// ordered step (clamped to `[0, 1]`), so it flips pixels whose gray lies
/// within `grain` of their cell threshold and the pattern crawls over time.
pub fn shade(rgb: [f32; 3], x: u32, y: u32, elapsed: f32, params: &DitherParams) -> f32 {
    let gray = apply_contrast(luma(rgb), params.contrast);
    let grained = (gray + grain_offset(x, y, elapsed, params.grain)).clamp(0.0, 1.0);
    ordered_step(grained, x, y, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dither::bayer::{CellSize, MatrixNormalization};

    fn flat_params(threshold: f32) -> DitherParams {
        DitherParams {
            threshold,
            contrast: 1.0,
            grain: 0.0,
            cell_size: CellSize::Eight,
            normalization: MatrixNormalization::Uniform,
        }
    }

    #[test]
    fn luma_weights_are_bt601() {
        assert!((luma([1.0, 0.0, 0.0]) - 0.299).abs() < 1e-6);
        assert!((luma([0.0, 1.0, 0.0]) - 0.587).abs() < 1e-6);
        assert!((luma([0.0, 0.0, 1.0]) - 0.114).abs() < 1e-6);
        assert!((luma([1.0, 1.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn contrast_pivots_on_midpoint_and_clamps() {
        assert!((apply_contrast(0.5, 3.0) - 0.5).abs() < 1e-6);
        assert_eq!(apply_contrast(0.9, 5.0), 1.0);
        assert_eq!(apply_contrast(0.1, 5.0), 0.0);
        assert!((apply_contrast(0.75, 1.0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn output_is_binary_for_any_grain() {
        for grain in [0.0, 0.05, 0.5, 1.0, 3.0] {
            let params = DitherParams {
                grain,
                ..DitherParams::default()
            };
            for y in 0..16 {
                for x in 0..16 {
                    let gray = (x + y * 16) as f32 / 255.0;
                    let v = shade([gray, gray, gray], x, y, 1.3, &params);
                    assert!(v == 0.0 || v == 1.0, "grain {grain} gave {v}");
                }
            }
        }
    }

    #[test]
    fn white_count_never_increases_with_threshold() {
        let mut previous = u32::MAX;
        for step in 0..=10 {
            let params = flat_params(step as f32 / 10.0);
            let whites = (0..8)
                .flat_map(|y| (0..8).map(move |x| (x, y)))
                .filter(|&(x, y)| shade([0.5, 0.5, 0.5], x, y, 0.0, &params) == 1.0)
                .count() as u32;
            assert!(whites <= previous, "threshold step {step}: {whites} > {previous}");
            previous = whites;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn mid_gray_reproduces_matrix_crossings() {
        let params = flat_params(0.5);
        let gray = apply_contrast(luma([0.5, 0.5, 0.5]), 1.0);
        for y in 0..8 {
            for x in 0..8 {
                let m = bayer::lookup(CellSize::Eight, x, y, MatrixNormalization::Uniform);
                let expected = if gray >= effective_threshold(0.5, m) { 1.0 } else { 0.0 };
                assert_eq!(shade([0.5, 0.5, 0.5], x, y, 0.0, &params), expected);
                assert_eq!(shade([0.5, 0.5, 0.5], x, y, 9.0, &params), expected);
            }
        }
    }

    #[test]
    fn default_grain_flips_pixels_over_time() {
        let params = DitherParams::default();
        let mut flipped = 0;
        for y in 0..32 {
            for x in 0..32 {
                let gray = (x + y * 32) as f32 / 1023.0;
                let rgb = [gray, gray, gray];
                if shade(rgb, x, y, 0.0, &params) != shade(rgb, x, y, 5.0, &params) {
                    flipped += 1;
                }
            }
        }
        assert!(flipped > 0, "grain 0.05 never changed a pixel");
    }

    #[test]
    fn zero_grain_is_static() {
        let params = flat_params(0.5);
        assert_eq!(grain_offset(3, 4, 7.0, 0.0), 0.0);
        for x in 0..8 {
            assert_eq!(
                shade([0.4, 0.4, 0.4], x, 2, 0.0, &params),
                shade([0.4, 0.4, 0.4], x, 2, 42.0, &params)
            );
        }
    }

    #[test]
    fn extreme_thresholds_are_degenerate_not_errors() {
        let low = flat_params(-5.0);
        let high = flat_params(5.0);
        assert_eq!(shade([0.2, 0.2, 0.2], 3, 3, 0.0, &low), 1.0);
        assert_eq!(shade([0.8, 0.8, 0.8], 3, 3, 0.0, &high), 0.0);
    }
}
