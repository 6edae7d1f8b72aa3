//! Resilience policies composed around remote calls.
//!
//! Three policies guard a remote dependency: bounded retry with exponential
//! backoff, a rolling-window circuit breaker, and a token-bucket rate
//! limiter. Policy state is owned by the client instance wrapping the
//! dependency, not shared globally.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the computed backoff delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the given attempt (1-based; attempt 0 is the
    /// initial call and never waits).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let millis = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// One trial call is allowed to probe recovery.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0.0..=1.0) over the rolling window that opens the
    /// circuit.
    pub failure_rate_threshold: f64,
    /// Outcomes required in the window before the rate is considered.
    pub minimum_calls: usize,
    /// Width of the rolling outcome window.
    pub rolling_window: Duration,
    /// Time the circuit stays open before probing with a trial call.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_calls: 5,
            rolling_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Rolling-window circuit breaker.
///
/// Callers must pair every `allow_call` that returned true with exactly one
/// `record_success` or `record_failure`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    opened_at: Option<Instant>,
    outcomes: VecDeque<(Instant, bool)>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            opened_at: None,
            outcomes: VecDeque::new(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns true if a call may proceed right now.
    pub fn allow_call(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.cooldown {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            // Trial call succeeded, service recovered.
            self.state = CircuitState::Closed;
            self.opened_at = None;
            self.outcomes.clear();
            return;
        }
        self.push_outcome(true);
    }

    /// Records a failed call outcome, possibly tripping the circuit.
    pub fn record_failure(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trip();
            return;
        }
        self.push_outcome(false);

        if self.outcomes.len() >= self.config.minimum_calls {
            let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
            let rate = failures as f64 / self.outcomes.len() as f64;
            if rate >= self.config.failure_rate_threshold {
                self.trip();
            }
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.outcomes.clear();
    }

    fn push_outcome(&mut self, ok: bool) {
        let now = Instant::now();
        self.outcomes.push_back((now, ok));
        while let Some(&(at, _)) = self.outcomes.front() {
            if now.duration_since(at) > self.config.rolling_window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Token-bucket rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum burst size.
    pub capacity: f64,
    /// Tokens restored per second.
    pub refill_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 20.0,
            refill_per_second: 10.0,
        }
    }
}

/// Token-bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let tokens = config.capacity;
        Self {
            config,
            tokens,
            last_refill: Instant::now(),
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens =
            (self.tokens + elapsed * self.config.refill_per_second).min(self.config.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Bundle of all resilience settings for one remote dependency.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub call_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            call_timeout: Duration::from_secs(5),
        }
    }
}
