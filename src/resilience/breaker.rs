//! Circuit breaker protecting a downstream endpoint.
//!
//! States:
//! - Closed: normal operation, requests pass through
//! - Open: consecutive failures exceeded the threshold, requests rejected
//! - HalfOpen: one trial request probes recovery

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker for one tenant channel.
pub struct CircuitBreaker {
    /// Consecutive failures before opening
    failure_threshold: u32,

    /// Time to wait before transitioning from open to half-open
    recovery_timeout: Duration,

    /// Current state
    state: RwLock<CircuitState>,

    /// Consecutive failures
    failures: AtomicU32,

    /// Time when circuit opened
    opened_at: RwLock<Option<Instant>>,

    /// Total times circuit opened
    open_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout,
            state: RwLock::new(CircuitState::Closed),
            failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            open_count: AtomicU64::new(0),
        }
    }

    /// Get current state.
    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }

    /// Check if a request should be allowed. While open, the first call
    /// after the recovery timeout transitions to half-open and is admitted
    /// as the trial request.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if self.should_attempt_reset() {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                // Single trial success closes the circuit.
                self.transition_to_closed();
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                // Trial failure reopens for another recovery period.
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    fn should_attempt_reset(&self) -> bool {
        self.opened_at
            .read()
            .unwrap()
            .map(|at| at.elapsed() >= self.recovery_timeout)
            .unwrap_or(false)
    }

    fn transition_to_closed(&self) {
        let mut state = self.state.write().unwrap();
        if *state != CircuitState::Closed {
            info!("circuit breaker closed");
            *state = CircuitState::Closed;
            self.failures.store(0, Ordering::SeqCst);
            *self.opened_at.write().unwrap() = None;
        }
    }

    fn transition_to_open(&self) {
        let mut state = self.state.write().unwrap();
        if *state != CircuitState::Open {
            warn!("circuit breaker opened");
            *state = CircuitState::Open;
            *self.opened_at.write().unwrap() = Some(Instant::now());
            self.open_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn transition_to_half_open(&self) {
        let mut state = self.state.write().unwrap();
        if *state == CircuitState::Open {
            debug!("circuit breaker half-open");
            *state = CircuitState::HalfOpen;
        }
    }

    /// Get consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get total times the circuit has opened.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, recovery: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
        }
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new(&config(3, Duration::from_secs(30)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cb = CircuitBreaker::new(&config(3, Duration::from_secs(30)));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert_eq!(cb.open_count(), 1);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(&config(3, Duration::from_secs(30)));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new(&config(1, Duration::from_millis(0)));

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Recovery timeout of zero makes the next request the trial.
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_trial_success_closes() {
        let cb = CircuitBreaker::new(&config(1, Duration::from_millis(0)));

        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_trial_failure_reopens() {
        let cb = CircuitBreaker::new(&config(1, Duration::from_millis(0)));

        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.open_count(), 2);
    }
}
