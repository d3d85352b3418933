//! Software dither renderer. Deterministic for a given `(image, box, elapsed,
//! params)`, which makes it the reference the GPU path is compared against.

use anyhow::{bail, Result};
use image::{Rgba, RgbaImage};

use super::fit::{fit_contain, FitRect};
use super::params::DitherParams;
use super::shade::shade;

pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Render one dithered frame of `box_width`x`box_height` pixels.
///
/// The image is aspect-fitted and centred; pixels outside the fitted plane are
/// filled with `background`. Pixels inside are strictly black or white with
/// full opacity.
pub fn render_frame(
    image: &RgbaImage,
    box_width: u32,
    box_height: u32,
    elapsed: f32,
    params: &DitherParams,
    background: [u8; 4],
) -> Result<RgbaImage> {
    if box_width == 0 || box_height == 0 {
        bail!("output box must be positive, got {}x{}", box_width, box_height);
    }

    let rect = fit_contain(
        box_width as f32,
        box_height as f32,
        image.width(),
        image.height(),
    )?;

    let mut frame = RgbaImage::from_pixel(box_width, box_height, Rgba(background));
    let (x0, y0, x1, y1) = rect.pixel_bounds();

    for y in y0..y1.min(box_height) {
        for x in x0..x1.min(box_width) {
            let Some(rgb) = sample_nearest(image, &rect, x, y) else {
                continue;
            };
            let level = if shade(rgb, x, y, elapsed, params) >= 1.0 {
                255
            } else {
                0
            };
            frame.put_pixel(x, y, Rgba([level, level, level, 255]));
        }
    }

    Ok(frame)
}

/// Nearest-neighbour sample of the source at the centre of screen pixel `(x, y)`.
fn sample_nearest(image: &RgbaImage, rect: &FitRect, x: u32, y: u32) -> Option<[f32; 3]> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let u = (x as f32 + 0.5 - rect.x) / rect.width;
    let v = (y as f32 + 0.5 - rect.y) / rect.height;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return None;
    }

    let sx = ((u * image.width() as f32) as u32).min(image.width() - 1);
    let sy = ((v * image.height() as f32) as u32).min(image.height() - 1);
    let px = image.get_pixel(sx, sy).0;
    Some([
        f32::from(px[0]) / 255.0,
        f32::from(px[1]) / 255.0,
        f32::from(px[2]) / 255.0,
    ])
}
