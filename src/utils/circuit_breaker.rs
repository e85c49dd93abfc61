use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Stops hammering a dependency that keeps failing.
//
//   Closed   --(open_after consecutive failures)-->  Open
//   Open     --(cool_down elapsed, next call)----->  HalfOpen
//   HalfOpen --(close_after consecutive successes)-> Closed
//   HalfOpen --(any failure)---------------------->  Open
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub open_after: u32,
    /// How long to reject calls before probing again
    pub cool_down: Duration,
    /// Consecutive half-open successes needed to close again
    pub close_after: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            open_after: 5,
            cool_down: Duration::from_secs(30),
            close_after: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit {0} is open")]
    Open(String),

    #[error(transparent)]
    Inner(E),
}

struct Counters {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    counters: Arc<Mutex<Counters>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            counters: Arc::new(Mutex::new(Counters {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
        }
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.admit().await?;

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.counters.lock().await.state
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut c = self.counters.lock().await;
        if c.state != CircuitState::Open {
            return Ok(());
        }

        let cooled = c
            .opened_at
            .map_or(true, |opened| opened.elapsed() >= self.config.cool_down);
        if !cooled {
            return Err(CircuitBreakerError::Open(self.name.clone()));
        }

        tracing::info!(circuit = %self.name, "Circuit half-open, probing");
        c.state = CircuitState::HalfOpen;
        c.successes = 0;
        Ok(())
    }

    async fn on_success(&self) {
        let mut c = self.counters.lock().await;
        c.failures = 0;

        if c.state == CircuitState::HalfOpen {
            c.successes += 1;
            if c.successes >= self.config.close_after {
                tracing::info!(circuit = %self.name, "Circuit closed");
                c.state = CircuitState::Closed;
                c.successes = 0;
                c.opened_at = None;
            }
        }
    }

    async fn on_failure(&self) {
        let mut c = self.counters.lock().await;
        c.failures += 1;

        let trip = match c.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => c.failures >= self.config.open_after,
            CircuitState::Open => false,
        };

        if trip {
            tracing::warn!(circuit = %self.name, failures = c.failures, "Circuit opened");
            c.state = CircuitState::Open;
            c.successes = 0;
            c.opened_at = Some(Instant::now());
        }
    }
}
