use std::time::{Duration, Instant};

/// Accumulates wall time and hands it out in fixed slices
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    frame_time: f64,
    unprocessed: f64,
}

impl FixedTimestep {
    pub fn new(frame_time: f64) -> Self {
        Self {
            frame_time: frame_time.max(f64::EPSILON),
            unprocessed: 0.0,
        }
    }

    pub fn accumulate(&mut self, elapsed: f64) {
        if elapsed > 0.0 {
            self.unprocessed += elapsed;
        }
    }

    /// Take one slice if more than a full slice is waiting
    pub fn consume(&mut self) -> bool {
        if self.unprocessed > self.frame_time {
            self.unprocessed -= self.frame_time;
            true
        } else {
            false
        }
    }

    pub fn unprocessed(&self) -> f64 {
        self.unprocessed
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }
}

/// Counts rendered frames and publishes the count once per second
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    elapsed: f64,
    frames: u32,
    fps: u32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_time(&mut self, elapsed: f64) {
        if elapsed > 0.0 {
            self.elapsed += elapsed;
        }
    }

    pub fn frame(&mut self) {
        self.frames += 1;
    }

    /// New fps value once a full second has gone by
    pub fn poll(&mut self) -> Option<u32> {
        if self.elapsed < 1.0 {
            return None;
        }
        self.fps = self.frames;
        self.frames = 0;
        self.elapsed = 0.0;
        Some(self.fps)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Fires on the first tick and then every `interval` ticks
#[derive(Debug, Clone)]
pub struct FrameSampler {
    interval: u64,
    count: u64,
}

impl FrameSampler {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            count: 0,
        }
    }

    pub fn tick(&mut self) -> bool {
        self.count += 1;
        self.count == 1 || self.count % self.interval == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Time budget of a single frame
#[derive(Debug, Clone)]
pub struct FrameBudget {
    frame_start: Instant,
    target_frame_time: Duration,
}

impl FrameBudget {
    pub fn new(target_frame_time: Duration) -> Self {
        Self {
            frame_start: Instant::now(),
            target_frame_time,
        }
    }

    pub fn start_frame(&mut self) {
        self.frame_start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.frame_start.elapsed()
    }

    pub fn is_over_budget(&self) -> bool {
        self.elapsed() > self.target_frame_time
    }

    /// Share of the target frame time used so far
    pub fn usage_percentage(&self) -> f32 {
        (self.elapsed().as_secs_f32() / self.target_frame_time.as_secs_f32().max(f32::EPSILON)) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestep_consumes_whole_slices() {
        let mut step = FixedTimestep::new(0.25);
        step.accumulate(0.6);

        assert!(step.consume());
        assert!(step.consume());
        assert!(!step.consume());
        assert!((step.unprocessed() - 0.1).abs() < 1e-9);

        // Exactly one slice waiting is not enough
        let mut exact = FixedTimestep::new(0.5);
        exact.accumulate(0.5);
        assert!(!exact.consume());
    }

    #[test]
    fn test_fps_published_once_per_second() {
        let mut fps = FpsCounter::new();
        for _ in 0..31 {
            fps.add_time(0.03125);
            fps.frame();
            assert_eq!(fps.poll(), None);
        }
        fps.add_time(0.03125);
        fps.frame();
        assert_eq!(fps.poll(), Some(32));
        assert_eq!(fps.poll(), None);
        assert_eq!(fps.fps(), 32);
    }

    #[test]
    fn test_sampler_fires_first_and_every_interval() {
        let mut sampler = FrameSampler::new(3);
        let fired: Vec<bool> = (0..7).map(|_| sampler.tick()).collect();
        assert_eq!(fired, vec![true, false, true, false, false, true, false]);
    }
}
