//! Circuit breaker per external collaborator
//!
//! Lifecycle: closed → open after `failure_threshold` consecutive failures →
//! half-open once `cooldown` has elapsed → closed when the single probe call
//! succeeds, or open again when it fails.
//!
//! One breaker instance is shared by every concurrent call in the process.
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! await point; callers hold a [`BreakerPermit`] for the duration of the
//! external call instead.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use call_agent_core::Collaborator;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    collaborator: Collaborator,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(collaborator: Collaborator, config: BreakerConfig) -> Self {
        Self {
            collaborator,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn collaborator(&self) -> Collaborator {
        self.collaborator
    }

    /// Current state, accounting for an elapsed cooldown
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock();
        match inner.state {
            BreakerState::Open if self.cooldown_elapsed(&inner) => BreakerState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Whether a call would currently be let through
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => self.cooldown_elapsed(&inner),
            BreakerState::HalfOpen => !inner.probe_in_flight,
        }
    }

    fn cooldown_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .map(|at| at.elapsed() >= self.config.cooldown)
            .unwrap_or(true)
    }

    /// Ask to make one call. `None` means short-circuit.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Some(BreakerPermit::new(self, false)),
            BreakerState::Open => {
                if !self.cooldown_elapsed(&inner) {
                    return None;
                }
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = true;
                tracing::info!(
                    collaborator = %self.collaborator,
                    "Circuit half-open, probing collaborator"
                );
                Some(BreakerPermit::new(self, true))
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    return None;
                }
                inner.probe_in_flight = true;
                Some(BreakerPermit::new(self, true))
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        // A late success from a call admitted before the breaker opened
        // does not close it; only the probe can.
        if inner.state != BreakerState::Closed && !probe {
            return;
        }
        if inner.state != BreakerState::Closed {
            tracing::info!(collaborator = %self.collaborator, "Circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_open = if probe {
            true
        } else {
            inner.state == BreakerState::Closed
                && inner.consecutive_failures >= self.config.failure_threshold
        };

        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;
            tracing::warn!(
                collaborator = %self.collaborator,
                failures = inner.consecutive_failures,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "Circuit opened"
            );
            metrics::counter!(
                "circuit_breaker_open_total",
                "collaborator" => self.collaborator.as_str()
            )
            .increment(1);
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if probe {
            let mut inner = self.inner.lock();
            inner.probe_in_flight = false;
        }
    }
}

/// Admission for one call. Report the outcome with `success` or `failure`;
/// dropping it unreported (e.g. a cancelled call) frees a probe slot without
/// counting as either.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    reported: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            reported: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_abandoned(self.probe);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            Collaborator::Scheduling,
            BreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let b = breaker(3, 1_000);
        for _ in 0..2 {
            b.try_acquire().unwrap().failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.try_acquire().is_none());
        assert!(!b.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let b = breaker(3, 1_000);
        b.try_acquire().unwrap().failure();
        b.try_acquire().unwrap().failure();
        b.try_acquire().unwrap().success();
        assert_eq!(b.consecutive_failures(), 0);
        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_probe() {
        let b = breaker(1, 1_000);
        b.try_acquire().unwrap().failure();
        assert!(b.try_acquire().is_none());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(b.state(), BreakerState::HalfOpen);

        let probe = b.try_acquire().unwrap();
        assert!(probe.is_probe());
        assert!(b.try_acquire().is_none(), "second probe must be refused");

        probe.success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let b = breaker(1, 1_000);
        b.try_acquire().unwrap().failure();
        tokio::time::advance(Duration::from_millis(1_001)).await;

        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_frees_slot() {
        let b = breaker(1, 1_000);
        b.try_acquire().unwrap().failure();
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let probe = b.try_acquire().unwrap();
        drop(probe);
        assert!(b.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_open_breaker() {
        let b = breaker(1, 1_000);
        let early = b.try_acquire().unwrap();
        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), BreakerState::Open);

        early.success();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_breaker_is_shared_across_threads() {
        let b = std::sync::Arc::new(breaker(100, 1_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        if let Some(p) = b.try_acquire() {
                            p.failure();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.consecutive_failures(), 80);
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
