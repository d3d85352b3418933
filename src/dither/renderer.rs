//! Per-instance host driver for the dither effect.
//!
//! A [`DitherRenderer`] owns everything one dithered image needs: its
//! parameters, frame clock, source bitmap and (optionally) a GPU backend.
//! Several renderers can run side by side without sharing any mutable state.

use std::sync::Arc;

use anyhow::{bail, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::clock::FrameClock;
use super::cpu::{self, TRANSPARENT};
use super::fit::{fit_contain, FitRect};
use super::gpu::GpuDitherRenderer;
use super::params::DitherParams;
use super::source::{SourceCache, SourceState};

pub const DEFAULT_BOX_WIDTH: u32 = 600;
pub const DEFAULT_BOX_HEIGHT: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub params: DitherParams,
    pub box_width: u32,
    pub box_height: u32,
    pub background: [u8; 4],
    pub backend: Backend,
    pub label: String,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            params: DitherParams::default(),
            box_width: DEFAULT_BOX_WIDTH,
            box_height: DEFAULT_BOX_HEIGHT,
            background: TRANSPARENT,
            backend: Backend::Cpu,
            label: String::new(),
        }
    }
}

/// One rendered frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    pub elapsed: f32,
    pub fit: FitRect,
    pub image: RgbaImage,
}

pub struct DitherRenderer {
    options: RendererOptions,
    clock: FrameClock,
    source: SourceCache,
    gpu: Option<GpuDitherRenderer>,
    gpu_failed: bool,
}

impl DitherRenderer {
    pub fn new(options: RendererOptions) -> Self {
        Self {
            options,
            clock: FrameClock::new(),
            source: SourceCache::new(),
            gpu: None,
            gpu_failed: false,
        }
    }

    pub fn with_source(options: RendererOptions, uri: &str) -> Self {
        let mut renderer = Self::new(options);
        renderer.set_source(uri);
        renderer
    }

    pub fn params(&self) -> &DitherParams {
        &self.options.params
    }

    /// Alternate text for the visual. Available whatever the load state.
    pub fn accessible_label(&self) -> &str {
        &self.options.label
    }

    /// Select the image to dither. Only a changed URI triggers a new fetch.
    pub fn set_source(&mut self, uri: &str) {
        if self.source.request(uri) {
            self.gpu = None;
            self.gpu_failed = false;
        }
    }

    pub fn source_state(&mut self) -> SourceState {
        self.source.poll()
    }

    /// Block until the current source has loaded or failed.
    pub fn wait_for_source(&mut self) -> SourceState {
        self.source.wait()
    }

    pub fn box_size(&self) -> (u32, u32) {
        (self.options.box_width, self.options.box_height)
    }

    pub fn resize(&mut self, box_width: u32, box_height: u32) -> Result<()> {
        if box_width == 0 || box_height == 0 {
            bail!("output box must be positive, got {}x{}", box_width, box_height);
        }
        if (box_width, box_height) != self.box_size() {
            self.options.box_width = box_width;
            self.options.box_height = box_height;
            self.gpu = None;
            self.gpu_failed = false;
        }
        Ok(())
    }

    /// Fitted plane for the current box, once the source is known.
    pub fn fit(&mut self) -> Option<FitRect> {
        let image = self.source.poll().image().cloned()?;
        fit_contain(
            self.options.box_width as f32,
            self.options.box_height as f32,
            image.width(),
            image.height(),
        )
        .ok()
    }

    /// Per-frame callback: advance the wall clock and draw.
    ///
    /// Returns `None` while the source is pending or failed; failures are
    /// logged and never propagate.
    pub fn frame(&mut self) -> Option<Frame> {
        let elapsed = self.clock.tick_real();
        self.draw(elapsed)
    }

    /// Offline variant of [`Self::frame`]: advance by a fixed step.
    pub fn step(&mut self, dt_seconds: f32) -> Option<Frame> {
        let elapsed = self.clock.advance(dt_seconds);
        self.draw(elapsed)
    }

    /// Draw at an explicit time without touching the clock.
    pub fn draw(&mut self, elapsed: f32) -> Option<Frame> {
        let image = self.source.poll().image().cloned()?;
        let index = self.clock.frame_index();
        match self.render(&image, elapsed, index) {
            Ok(frame) => Some(frame),
            Err(error) => {
                tracing::warn!("dither frame failed: {error:#}");
                None
            }
        }
    }

    /// Release the bitmap and GPU resources. No further work happens after this.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.gpu = None;
        self.source.clear();
    }

    fn render(&mut self, image: &Arc<RgbaImage>, elapsed: f32, index: u32) -> Result<Frame> {
        let (width, height) = self.box_size();
        let fit = fit_contain(width as f32, height as f32, image.width(), image.height())?;

        if self.options.backend == Backend::Gpu && !self.gpu_failed {
            if let Some(rgba) = self.render_gpu(image, elapsed, index)? {
                let image = RgbaImage::from_raw(width, height, rgba)
                    .ok_or_else(|| anyhow::anyhow!("gpu readback size mismatch"))?;
                return Ok(Frame {
                    index,
                    elapsed,
                    fit,
                    image,
                });
            }
        }

        let image = cpu::render_frame(
            image,
            width,
            height,
            elapsed,
            &self.options.params,
            self.options.background,
        )?;
        Ok(Frame {
            index,
            elapsed,
            fit,
            image,
        })
    }

    /// `Ok(None)` means no adapter: fall back to the CPU path for this instance.
    fn render_gpu(
        &mut self,
        image: &RgbaImage,
        elapsed: f32,
        index: u32,
    ) -> Result<Option<Vec<u8>>> {
        if self.gpu.is_none() {
            let (width, height) = self.box_size();
            match pollster::block_on(GpuDitherRenderer::new(
                width,
                height,
                image,
                &self.options.params,
                self.options.background,
            )) {
                Ok(gpu) => self.gpu = Some(gpu),
                Err(error) => {
                    tracing::warn!("gpu dither backend unavailable, using cpu: {error:#}");
                    self.gpu_failed = true;
                    return Ok(None);
                }
            }
        }

        match self.gpu.as_mut() {
            Some(gpu) => gpu.render_frame_rgba(elapsed, index).map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for DitherRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dither::bayer::CellSize;
    use image::Rgba;
    use tempfile::tempdir;

    fn write_png(dir: &std::path::Path, name: &str, w: u32, h: u32, level: u8) -> String {
        let path = dir.join(name);
        RgbaImage::from_pixel(w, h, Rgba([level, level, level, 255]))
            .save(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn options(label: &str) -> RendererOptions {
        RendererOptions {
            box_width: 32,
            box_height: 16,
            label: label.to_owned(),
            ..RendererOptions::default()
        }
    }

    #[test]
    fn emits_nothing_before_a_source_is_set() {
        let mut renderer = DitherRenderer::new(options("empty"));
        assert!(renderer.frame().is_none());
        assert_eq!(renderer.accessible_label(), "empty");
    }

    #[test]
    fn failed_source_stays_blank_but_keeps_label() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let mut renderer =
            DitherRenderer::with_source(options("a missing cat"), &missing.to_string_lossy());
        assert!(matches!(renderer.wait_for_source(), SourceState::Failed(_)));
        assert!(renderer.frame().is_none());
        assert_eq!(renderer.accessible_label(), "a missing cat");
    }

    #[test]
    fn renders_fitted_frames_once_loaded() {
        let dir = tempdir().unwrap();
        let uri = write_png(dir.path(), "wide.png", 20, 10, 90);
        let mut renderer = DitherRenderer::with_source(options("wide"), &uri);
        renderer.wait_for_source();

        let frame = renderer.step(1.0 / 30.0).expect("frame should render");
        assert_eq!(frame.image.dimensions(), (32, 16));
        assert_eq!((frame.fit.width, frame.fit.height), (32.0, 16.0));
        assert_eq!(frame.index, 1);
    }

    #[test]
    fn resize_refits_and_rejects_zero() {
        let dir = tempdir().unwrap();
        let uri = write_png(dir.path(), "square.png", 10, 10, 90);
        let mut renderer = DitherRenderer::with_source(options("square"), &uri);
        renderer.wait_for_source();

        renderer.resize(40, 20).unwrap();
        let fit = renderer.fit().unwrap();
        assert_eq!((fit.x, fit.width, fit.height), (10.0, 20.0, 20.0));
        assert!(renderer.resize(0, 20).is_err());
        assert_eq!(renderer.box_size(), (40, 20));
    }

    #[test]
    fn instances_do_not_share_state() {
        let dir = tempdir().unwrap();
        let uri = write_png(dir.path(), "gray.png", 8, 8, 128);

        let mut fine = DitherRenderer::with_source(
            RendererOptions {
                params: DitherParams {
                    grain: 0.0,
                    cell_size: CellSize::Four,
                    ..DitherParams::default()
                },
                ..options("fine")
            },
            &uri,
        );
        let mut coarse = DitherRenderer::with_source(
            RendererOptions {
                params: DitherParams {
                    grain: 0.0,
                    cell_size: CellSize::Eight,
                    ..DitherParams::default()
                },
                ..options("coarse")
            },
            &uri,
        );
        fine.wait_for_source();
        coarse.wait_for_source();

        let a = fine.draw(0.0).unwrap();
        coarse.step(5.0);
        let b = fine.draw(0.0).unwrap();
        assert_eq!(a.image, b.image);
        assert_eq!(fine.params().cell_size, CellSize::Four);
    }

    #[test]
    fn same_uri_is_not_refetched() {
        let dir = tempdir().unwrap();
        let uri = write_png(dir.path(), "once.png", 4, 4, 10);
        let mut renderer = DitherRenderer::with_source(options("once"), &uri);
        renderer.wait_for_source();
        std::fs::remove_file(&uri).unwrap();

        renderer.set_source(&uri);
        assert!(matches!(renderer.source_state(), SourceState::Ready(_)));
        renderer.dispose();
    }
}
