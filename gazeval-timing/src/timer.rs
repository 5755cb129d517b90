use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Clock shared by the renderer, triggers and devices.
///
/// Time is reported in seconds since the timer was created so that it can be
/// written straight into event timestamps and log messages.
pub trait Timer: Send + Sync {
    fn now(&self) -> f64;
    fn sleep(&self, d: Duration);

    fn elapsed(&self, since: f64) -> Duration {
        Duration::from_secs_f64((self.now() - since).max(0.0))
    }
}

pub type SharedTimer = Arc<dyn Timer>;

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn shared() -> SharedTimer {
        Arc::new(Self::new())
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        self.spin_sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn spin_sleep(&self, duration: Duration) {
        if duration.as_nanos() < 100_000 {
            let start = Instant::now();
            while start.elapsed() < duration {
                std::hint::spin_loop();
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic clock for tests and headless runs. Sleeping advances time
/// instantly; clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now: Arc<Mutex<f64>>,
}

impl ManualTimer {
    pub fn new(start: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }

    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> f64 {
        self.now.lock().map(|t| *t).unwrap_or_default()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_secs_f64());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

/// Rolling window of flip-to-flip intervals.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frame_times: VecDeque<Duration>,
    max_samples: usize,
    last_flip: Option<f64>,
}

impl FrameStats {
    pub fn new(max_samples: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            last_flip: None,
        }
    }

    /// Records a flip at `time` seconds; the first flip only sets the origin.
    pub fn record_flip(&mut self, time: f64) {
        if let Some(prev) = self.last_flip {
            self.record_frame(Duration::from_secs_f64((time - prev).max(0.0)));
        }
        self.last_flip = Some(time);
    }

    pub fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.frame_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_times.is_empty()
    }

    pub fn calibration_stats(&self) -> TimingStats {
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return TimingStats {
                average_frame_time_ns: 0.0,
                jitter_ns: 0.0,
                min_frame_time_ns: 0.0,
                max_frame_time_ns: 0.0,
                effective_fps: 0.0,
            };
        }
        let sum: f64 = times.iter().sum();
        let avg = sum / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TimingStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_sleep_advances_shared_clock() {
        let timer = ManualTimer::new(1.0);
        let other = timer.clone();
        timer.sleep(Duration::from_millis(250));
        assert!((other.now() - 1.25).abs() < 1e-12);
        other.set(10.0);
        assert_eq!(timer.elapsed(9.5), Duration::from_millis(500));
        assert_eq!(timer.elapsed(11.0), Duration::ZERO);
    }

    #[test]
    fn high_precision_timer_is_monotonic() {
        let timer = HighPrecisionTimer::new();
        let a = timer.now();
        timer.sleep(Duration::from_millis(1));
        assert!(timer.now() >= a);
    }

    #[test]
    fn frame_stats_from_flips() {
        let mut stats = FrameStats::new(2);
        assert!(stats.is_empty());
        for t in [0.0, 0.010, 0.030, 0.050] {
            stats.record_flip(t);
        }
        // window keeps the last two 20ms intervals
        assert_eq!(stats.len(), 2);
        let s = stats.calibration_stats();
        assert!((s.average_frame_time_ns - 20e6).abs() < 1.0);
        assert!(s.jitter_ns < 1.0);
        assert!((s.effective_fps - 50.0).abs() < 1e-6);
    }
}
