//! LLM resilience wrapper.
//!
//! A circuit breaker around any [`LlmProvider`]: after a run of consecutive
//! failures the circuit opens and calls fail fast, so the deterministic
//! fallbacks on the request path engage without waiting out another
//! timeout. After a reset period the breaker lets a limited number of
//! trial calls through (half-open) before closing again.
//!
//! The wrapper does not retry: request-path reasoning calls degrade to
//! their fallbacks on the first failure, and background jobs carry their
//! own backoff policy in the scheduler.

use super::LlmProvider;
use crate::config::LlmConfig;
use crate::{Error, Result};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker configuration for LLM calls.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long to keep the circuit open before half-open.
    pub reset_timeout_ms: u64,
    /// Maximum trial calls while half-open.
    pub half_open_max_calls: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl ResilienceConfig {
    /// Loads breaker configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(threshold) = config.breaker_failure_threshold {
            settings.failure_threshold = threshold.max(1);
        }
        if let Some(reset_ms) = config.breaker_reset_ms {
            settings.reset_timeout_ms = reset_ms;
        }
        if let Some(half_open) = config.breaker_half_open_max_calls {
            settings.half_open_max_calls = half_open.max(1);
        }
        settings
    }
}

/// Circuit breaker state machine.
#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { attempts: u32 },
}

#[derive(Debug)]
struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
}

impl CircuitBreaker {
    fn new(config: &ResilienceConfig) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }

    fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    self.state = BreakerState::HalfOpen { attempts: 0 };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen { ref mut attempts } => {
                if *attempts >= self.half_open_max_calls {
                    false
                } else {
                    *attempts += 1;
                    true
                }
            },
        }
    }

    const fn on_success(&mut self) {
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failure; returns `true` when the circuit trips open.
    fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    self.state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                    return true;
                }
            },
            BreakerState::HalfOpen { .. } => {
                self.state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
                return true;
            },
            BreakerState::Open { .. } => {},
        }
        false
    }
}

/// LLM provider wrapper with a circuit breaker.
pub struct ResilientProvider<P: LlmProvider> {
    inner: P,
    breaker: Mutex<CircuitBreaker>,
}

impl<P: LlmProvider> ResilientProvider<P> {
    /// Creates a new resilient provider wrapper.
    #[must_use]
    pub fn new(inner: P, config: ResilienceConfig) -> Self {
        let breaker = CircuitBreaker::new(&config);
        Self {
            inner,
            breaker: Mutex::new(breaker),
        }
    }

    fn guard<T>(&self, operation: &'static str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let provider: &'static str = self.inner.name();

        let mut breaker = self
            .breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !breaker.allow() {
            drop(breaker);
            metrics::counter!(
                "llm_requests_total",
                "provider" => provider,
                "operation" => operation,
                "status" => "circuit_open"
            )
            .increment(1);
            return Err(Error::OperationFailed {
                operation: format!("llm_{operation}"),
                cause: "circuit breaker open".to_string(),
            });
        }
        drop(breaker);

        let start = Instant::now();
        let result = call();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut breaker = self
            .breaker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let status = match result {
            Ok(_) => {
                breaker.on_success();
                "success"
            },
            Err(_) => {
                if breaker.on_failure() {
                    tracing::warn!(provider, operation, "LLM circuit breaker opened");
                    metrics::counter!("llm_circuit_breaker_trips_total", "provider" => provider)
                        .increment(1);
                }
                "error"
            },
        };
        drop(breaker);

        metrics::counter!(
            "llm_requests_total",
            "provider" => provider,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "llm_request_duration_ms",
            "provider" => provider,
            "operation" => operation
        )
        .record(elapsed_ms);

        result
    }
}

impl<P: LlmProvider> LlmProvider for ResilientProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.guard("complete", || self.inner.complete(prompt))
    }

    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        self.guard("complete_with_system", || {
            self.inner.complete_with_system(system, user)
        })
    }
}
