use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Paces the render loop and keeps a rolling frame-interval window.
///
/// Without a cap the loop is paced by presentation (vsync) alone and the clock
/// only measures.
#[derive(Debug)]
pub struct FrameClock {
    max_fps: Option<f32>,
    frame_count: u64,
    frame_started_at: Option<Instant>,
    frame_intervals: VecDeque<Duration>,
    max_intervals: usize,
}

impl FrameClock {
    pub fn new(max_fps: Option<f32>) -> Self {
        Self {
            max_fps: max_fps.map(|fps| fps.max(1.0)),
            frame_count: 0,
            frame_started_at: None,
            frame_intervals: VecDeque::new(),
            max_intervals: 90,
        }
    }

    pub fn max_fps(&self) -> Option<f32> {
        self.max_fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frame_duration(&self) -> Option<Duration> {
        self.max_fps.map(|fps| Duration::from_secs_f32(1.0 / fps))
    }

    pub fn begin_frame(&mut self, now: Instant) {
        if let Some(previous) = self.frame_started_at {
            self.record_interval(now.saturating_duration_since(previous));
        }
        self.frame_started_at = Some(now);
        self.frame_count += 1;
    }

    /// How long to wait before the next frame may start. `None` when uncapped
    /// or when the current frame already overran its budget.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let started_at = self.frame_started_at?;
        let deadline = started_at + self.frame_duration()?;
        let remaining = deadline.saturating_duration_since(now);
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Forgets timing history so a pause (hidden window, device recovery)
    /// does not show up as one enormous frame interval.
    pub fn reset_timing(&mut self) {
        self.frame_started_at = None;
        self.frame_intervals.clear();
    }

    pub fn average_fps(&self) -> f32 {
        if self.frame_intervals.is_empty() {
            return 0.0;
        }

        let sum: Duration = self.frame_intervals.iter().copied().sum();
        let avg = sum / self.frame_intervals.len() as u32;

        if avg.is_zero() {
            return 0.0;
        }

        1.0 / avg.as_secs_f32()
    }

    fn record_interval(&mut self, interval: Duration) {
        self.frame_intervals.push_back(interval);
        if self.frame_intervals.len() > self.max_intervals {
            self.frame_intervals.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_clock_never_waits() {
        let start = Instant::now();
        let mut clock = FrameClock::new(None);
        clock.begin_frame(start);

        assert_eq!(clock.frame_duration(), None);
        assert_eq!(clock.remaining(start), None);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn capped_clock_waits_out_the_frame_budget() {
        let start = Instant::now();
        let mut clock = FrameClock::new(Some(50.0));
        clock.begin_frame(start);

        let after_5ms = start + Duration::from_millis(5);
        let remaining = clock.remaining(after_5ms).unwrap();
        assert!(remaining > Duration::from_millis(14));
        assert!(remaining < Duration::from_millis(16));

        assert_eq!(clock.remaining(start + Duration::from_millis(40)), None);
    }

    #[test]
    fn average_fps_uses_frame_intervals() {
        let start = Instant::now();
        let mut clock = FrameClock::new(None);
        assert_eq!(clock.average_fps(), 0.0);

        for i in 0..11 {
            clock.begin_frame(start + Duration::from_millis(10 * i));
        }

        let fps = clock.average_fps();
        assert!((fps - 100.0).abs() < 0.5, "fps was {}", fps);
    }

    #[test]
    fn reset_timing_drops_history_but_keeps_count() {
        let start = Instant::now();
        let mut clock = FrameClock::new(Some(60.0));
        clock.begin_frame(start);
        clock.begin_frame(start + Duration::from_millis(16));
        clock.reset_timing();

        assert_eq!(clock.average_fps(), 0.0);
        assert_eq!(clock.remaining(start), None);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn clamps_fps_floor() {
        let clock = FrameClock::new(Some(0.0));
        assert_eq!(clock.max_fps(), Some(1.0));
    }
}
