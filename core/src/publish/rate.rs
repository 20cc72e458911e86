use std::time::Duration;

use tokio::time::Instant;

/// Slowest accepted pace; one frame every 100 s.
pub const MIN_TARGET_FPS: f32 = 0.01;

/// Minimum spacing between emissions: at most one per `1 / fps` seconds.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl RateLimiter {
    /// Rates below [`MIN_TARGET_FPS`] (or NaN) are raised to it.
    pub fn new(target_fps: f32) -> Self {
        let fps = target_fps.max(MIN_TARGET_FPS);
        Self {
            min_interval: Duration::from_secs_f32(1.0 / fps),
            last_emit: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Earliest instant the next emission may happen; `None` means now.
    pub fn next_eligible(&self) -> Option<Instant> {
        self.last_emit.map(|last| last + self.min_interval)
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        self.next_eligible().map_or(true, |at| now >= at)
    }

    /// Records an emission at `now` if allowed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.is_eligible(now) {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emission_is_immediate() {
        let mut limiter = RateLimiter::new(10.0);
        assert!(limiter.next_eligible().is_none());
        assert!(limiter.try_acquire(Instant::now()));
    }

    #[test]
    fn emissions_respect_window_bound() {
        let fps = 30.0_f32;
        let mut limiter = RateLimiter::new(fps);
        let start = Instant::now();
        let window = Duration::from_millis(1_000);

        // Hammer the limiter every millisecond.
        let emitted = (0..=window.as_millis() as u64)
            .filter(|ms| limiter.try_acquire(start + Duration::from_millis(*ms)))
            .count();
        let bound = (window.as_secs_f32() * fps).floor() as usize + 1;
        assert!(emitted <= bound, "{} > {}", emitted, bound);
        assert!(emitted >= bound - 1);
    }

    #[test]
    fn rejects_until_interval_elapses() {
        let mut limiter = RateLimiter::new(4.0);
        let start = Instant::now();
        assert!(limiter.try_acquire(start));
        assert!(!limiter.try_acquire(start + Duration::from_millis(249)));
        assert!(limiter.try_acquire(start + Duration::from_millis(250)));
    }

    #[test]
    fn degenerate_rates_are_clamped() {
        let slowest = Duration::from_secs(100);
        for fps in [1e-30, 0.0, -5.0, f32::NAN] {
            let limiter = RateLimiter::new(fps);
            assert!((limiter.min_interval().as_secs_f32() - slowest.as_secs_f32()).abs() < 1e-3);
        }
        assert_eq!(RateLimiter::new(f32::INFINITY).min_interval(), Duration::ZERO);
    }
}
