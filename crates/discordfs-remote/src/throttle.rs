//! Adaptive delay oracle for the uploader.
//!
//! Every upload waits a jittered base delay scaled by a multiplier that
//! errors push up and successes slowly relax. Rate-limit hits grow the
//! multiplier faster and are allowed past the normal-error ceiling, and a
//! rate-limit pause never relaxes below 2.0 so the pipeline stays cautious
//! after coming back.

use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RemoteError, RemoteResult};

/// Tuning knobs for the throttle. The defaults are the production values;
/// tests shrink them to keep wall-clock time down.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Lower bound of the random base delay.
    pub min_delay: Duration,
    /// Upper bound of the random base delay.
    pub max_delay: Duration,
    /// Multiplier growth on a non-429 error.
    pub backoff_multiplier: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1500),
            max_delay: Duration::from_millis(4200),
            backoff_multiplier: 1.5,
        }
    }
}

#[derive(Debug)]
struct ThrottleState {
    multiplier: f64,
    consecutive_errors: u32,
}

/// Adaptive throttle shared by all uploads of one store.
pub struct AdaptiveThrottle {
    config: ThrottleConfig,
    state: Mutex<ThrottleState>,
}

impl AdaptiveThrottle {
    /// Creates a throttle at baseline (multiplier 1.0, no errors).
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ThrottleState {
                multiplier: 1.0,
                consecutive_errors: 0,
            }),
        }
    }

    /// Computes the next wait: `max(0.5s, base × multiplier + micro)` where
    /// `base` is uniform in `[min_delay, max_delay]` and `micro` is a small
    /// uniform jitter of ±0.2 s.
    pub fn next_delay(&self) -> Duration {
        let multiplier = self.state.lock().multiplier;
        let mut rng = rand::thread_rng();
        let base = rng.gen_range(
            self.config.min_delay.as_secs_f64()..=self.config.max_delay.as_secs_f64(),
        );
        let micro = rng.gen_range(-0.2..=0.2);
        Duration::from_secs_f64((base * multiplier + micro).max(0.5))
    }

    /// Sleeps for [`Self::next_delay`], honoring cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> RemoteResult<()> {
        let delay = self.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "throttle wait");
        tokio::select! {
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Records a failed operation. A 429 triples the multiplier (ceiling
    /// 20.0); anything else grows it by the configured factor (ceiling 10.0).
    pub fn register_error(&self, status: Option<u16>) {
        let mut state = self.state.lock();
        state.consecutive_errors += 1;
        state.multiplier = if status == Some(429) {
            (state.multiplier * 3.0).min(20.0)
        } else {
            (state.multiplier * self.config.backoff_multiplier).min(10.0)
        };
        debug!(
            multiplier = state.multiplier,
            consecutive_errors = state.consecutive_errors,
            "throttle backoff"
        );
    }

    /// Records a success: error streak resets and the multiplier relaxes by
    /// 10%, never below 1.0. Recovery is gradual on purpose.
    pub fn register_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_errors = 0;
        if state.multiplier > 1.0 {
            state.multiplier = (state.multiplier * 0.9).max(1.0);
        }
    }

    /// Unconditional pause after a rate-limit hit, honoring cancellation.
    /// Afterwards the multiplier halves but never drops below 2.0.
    pub async fn rate_limit_pause(
        &self,
        pause: Duration,
        cancel: &CancellationToken,
    ) -> RemoteResult<()> {
        warn!(pause_secs = pause.as_secs(), "rate limit pause");
        tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
        let mut state = self.state.lock();
        state.multiplier = (state.multiplier / 2.0).max(2.0);
        Ok(())
    }

    /// Current multiplier, for observability and tests.
    pub fn current_multiplier(&self) -> f64 {
        self.state.lock().multiplier
    }

    /// Length of the current error streak.
    pub fn consecutive_errors(&self) -> u32 {
        self.state.lock().consecutive_errors
    }
}

impl Default for AdaptiveThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ThrottleConfig {
        ThrottleConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 1.5,
        }
    }

    #[test]
    fn starts_at_baseline() {
        let throttle = AdaptiveThrottle::default();
        assert_eq!(throttle.current_multiplier(), 1.0);
        assert_eq!(throttle.consecutive_errors(), 0);
    }

    #[test]
    fn single_rate_limit_triples_multiplier() {
        let throttle = AdaptiveThrottle::default();
        throttle.register_error(Some(429));
        assert_eq!(throttle.current_multiplier(), 3.0);
    }

    #[test]
    fn generic_errors_cap_at_ten() {
        let throttle = AdaptiveThrottle::default();
        for _ in 0..50 {
            throttle.register_error(None);
        }
        assert!(throttle.current_multiplier() <= 10.0);
    }

    #[test]
    fn rate_limits_cap_at_twenty() {
        let throttle = AdaptiveThrottle::default();
        for _ in 0..50 {
            throttle.register_error(Some(429));
        }
        assert_eq!(throttle.current_multiplier(), 20.0);
    }

    #[test]
    fn rate_limit_may_exceed_generic_ceiling() {
        let throttle = AdaptiveThrottle::default();
        for _ in 0..50 {
            throttle.register_error(None);
        }
        throttle.register_error(Some(429));
        assert!(throttle.current_multiplier() > 10.0);
    }

    #[test]
    fn success_decays_monotonically_toward_one() {
        let throttle = AdaptiveThrottle::default();
        throttle.register_error(Some(429));
        throttle.register_error(Some(429));

        let mut last = throttle.current_multiplier();
        for _ in 0..10 {
            throttle.register_success();
            let now = throttle.current_multiplier();
            assert!(now <= last);
            assert!(now >= 1.0);
            last = now;
        }

        for _ in 0..200 {
            throttle.register_success();
        }
        assert_eq!(throttle.current_multiplier(), 1.0);
    }

    #[test]
    fn success_resets_error_streak() {
        let throttle = AdaptiveThrottle::default();
        throttle.register_error(None);
        throttle.register_error(None);
        assert_eq!(throttle.consecutive_errors(), 2);
        throttle.register_success();
        assert_eq!(throttle.consecutive_errors(), 0);
    }

    #[test]
    fn multiplier_stays_in_bounds_under_mixed_traffic() {
        let throttle = AdaptiveThrottle::default();
        for i in 0..1000 {
            match i % 5 {
                0 => throttle.register_error(Some(429)),
                1 | 2 => throttle.register_error(None),
                _ => throttle.register_success(),
            }
            let m = throttle.current_multiplier();
            assert!((1.0..=20.0).contains(&m), "multiplier {m} out of bounds");
        }
    }

    #[test]
    fn next_delay_has_a_floor() {
        let throttle = AdaptiveThrottle::new(ThrottleConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 1.5,
        });
        for _ in 0..100 {
            assert!(throttle.next_delay() >= Duration::from_millis(500));
        }
    }

    #[test]
    fn next_delay_scales_with_multiplier() {
        let throttle = AdaptiveThrottle::default();
        for _ in 0..10 {
            throttle.register_error(Some(429));
        }
        // multiplier is 20.0; even the smallest base lands well above 20s
        assert!(throttle.next_delay() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn wait_is_cancellable() {
        let throttle = AdaptiveThrottle::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = throttle.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, RemoteError::Cancelled));
    }

    #[tokio::test]
    async fn rate_limit_pause_floors_multiplier_at_two() {
        let throttle = AdaptiveThrottle::new(fast_config());
        let cancel = CancellationToken::new();

        throttle
            .rate_limit_pause(Duration::from_millis(1), &cancel)
            .await
            .unwrap();
        assert_eq!(throttle.current_multiplier(), 2.0);

        for _ in 0..10 {
            throttle.register_error(Some(429));
        }
        throttle
            .rate_limit_pause(Duration::from_millis(1), &cancel)
            .await
            .unwrap();
        assert_eq!(throttle.current_multiplier(), 10.0);
    }

    #[tokio::test]
    async fn rate_limit_pause_is_cancellable() {
        let throttle = AdaptiveThrottle::new(fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = throttle
            .rate_limit_pause(Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Cancelled));
    }
}
