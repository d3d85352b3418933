use anyhow::{anyhow, Result};
use serde::Serialize;

/// Placement of the fitted image inside its container, in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FitRect {
    /// Integer pixel bounds `(x0, y0, x1, y1)`, exclusive at the far edge.
    pub fn pixel_bounds(&self) -> (u32, u32, u32, u32) {
        let x0 = self.x.round().max(0.0) as u32;
        let y0 = self.y.round().max(0.0) as u32;
        let x1 = (self.x + self.width).round().max(0.0) as u32;
        let y1 = (self.y + self.height).round().max(0.0) as u32;
        (x0, y0, x1, y1)
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// Largest rectangle with the image's aspect ratio that fits the container,
/// centred (letterbox when the image is wider, pillarbox when taller).
///
/// Zero image dimensions are treated as one pixel so a broken header still
/// yields a drawable plane.
pub fn fit_contain(
    container_width: f32,
    container_height: f32,
    image_width: u32,
    image_height: u32,
) -> Result<FitRect> {
    if !(container_width > 0.0 && container_height > 0.0) {
        return Err(anyhow!(
            "container must be positive, got {}x{}",
            container_width,
            container_height
        ));
    }

    let image_aspect = image_width.max(1) as f32 / image_height.max(1) as f32;
    let container_aspect = container_width / container_height;

    let (width, height) = if image_aspect > container_aspect {
        (container_width, container_width / image_aspect)
    } else {
        (container_height * image_aspect, container_height)
    };

    Ok(FitRect {
        x: (container_width - width) * 0.5,
        y: (container_height - height) * 0.5,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_fit(container: (f32, f32), image: (u32, u32)) {
        let rect = fit_contain(container.0, container.1, image.0, image.1).unwrap();
        let image_ratio = image.0 as f32 / image.1 as f32;
        assert!(
            (rect.width / rect.height / image_ratio - 1.0).abs() < 1e-4,
            "ratio drift for {image:?} in {container:?}: {rect:?}"
        );
        let touches_width = (rect.width - container.0).abs() < 1e-3;
        let touches_height = (rect.height - container.1).abs() < 1e-3;
        assert!(touches_width || touches_height, "{rect:?} touches neither side");
        assert!(rect.width <= container.0 + 1e-3 && rect.height <= container.1 + 1e-3);
    }

    #[test]
    fn preserves_ratio_and_touches_a_side() {
        assert_fit((800.0, 400.0), (1920, 1080));
        assert_fit((800.0, 400.0), (1080, 1920));
        assert_fit((400.0, 400.0), (640, 640));
        assert_fit((333.0, 777.0), (3, 1));
        assert_fit((1.0, 1000.0), (1000, 1));
    }

    #[test]
    fn wide_image_is_letterboxed_and_centred() {
        let rect = fit_contain(400.0, 400.0, 200, 100).unwrap();
        assert_eq!(rect.width, 400.0);
        assert_eq!(rect.height, 200.0);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 100.0);
        assert_eq!(rect.pixel_bounds(), (0, 100, 400, 300));
    }

    #[test]
    fn refitting_is_idempotent() {
        let first = fit_contain(640.0, 400.0, 300, 500).unwrap();
        let second = fit_contain(640.0, 400.0, 300, 500).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_image_dimensions_fall_back_to_one() {
        let rect = fit_contain(100.0, 50.0, 0, 0).unwrap();
        assert_eq!((rect.width, rect.height), (50.0, 50.0));
    }

    #[test]
    fn empty_container_is_rejected() {
        assert!(fit_contain(0.0, 100.0, 10, 10).is_err());
        assert!(fit_contain(100.0, f32::NAN, 10, 10).is_err());
    }
}
