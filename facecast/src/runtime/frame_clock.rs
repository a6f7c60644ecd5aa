use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Measures the time between presented frames. The first frame and long
/// stalls (debugger, minimised window) report a bounded delta.
#[derive(Debug)]
pub struct FrameClock {
    frame_count: u64,
    last_frame: Option<Instant>,
    max_delta: Duration,
    frame_intervals: VecDeque<Duration>,
    max_intervals: usize,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            last_frame: None,
            max_delta: Duration::from_millis(250),
            frame_intervals: VecDeque::new(),
            max_intervals: 90,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Records a frame at `now` and returns seconds since the previous one.
    pub fn frame(&mut self, now: Instant) -> f32 {
        let elapsed = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();

        self.last_frame = Some(now);
        self.frame_count += 1;

        if self.frame_count > 1 {
            self.record_interval(elapsed);
        }

        elapsed.min(self.max_delta).as_secs_f32()
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
