use std::time::{Duration, Instant};

/// Monotonic elapsed-time source for one renderer instance.
///
/// Live rendering ticks against the wall clock; offline rendering advances in
/// fixed steps so frame `n` always sees the same time.
#[derive(Debug, Clone)]
pub struct FrameClock {
    started: Instant,
    elapsed: Duration,
    frame_index: u32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            elapsed: Duration::ZERO,
            frame_index: 0,
        }
    }

    /// Catch up with the wall clock. Never moves backwards.
    pub fn tick_real(&mut self) -> f32 {
        let now = self.started.elapsed();
        if now > self.elapsed {
            self.elapsed = now;
        }
        self.frame_index = self.frame_index.saturating_add(1);
        self.elapsed_secs()
    }

    /// Advance by a fixed step (negative or NaN steps are ignored).
    pub fn advance(&mut self, dt_seconds: f32) -> f32 {
        if dt_seconds.is_finite() && dt_seconds > 0.0 {
            self.elapsed += Duration::from_secs_f32(dt_seconds);
        }
        self.frame_index = self.frame_index.saturating_add(1);
        self.elapsed_secs()
    }

    /// Time of frame `frame_index` at `fps`, without touching the clock.
    pub fn time_for_frame(frame_index: u32, fps: u32) -> f32 {
        frame_index as f32 / fps.max(1) as f32
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }
}
