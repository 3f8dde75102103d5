use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// When the breaker trips open.
///
/// - `Consecutive`: open after N failures in a row.
/// - `ErrorRate`: open once at least `threshold` calls were observed and
///   the failure ratio reaches `rate` (0 < rate < 1).
#[derive(Debug, Clone, Copy)]
pub enum TripPolicy {
    Consecutive { failures: u32 },
    ErrorRate { rate: f64, threshold: u64 },
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub policy: TripPolicy,
    /// How long the circuit stays open before a half-open probe is let
    /// through.
    pub cool_down: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: State,
    consecutive_failures: u32,
    total_calls: u64,
    total_failures: u64,
    opened_at: Option<Instant>,
}

/// Process-wide outbound-call gate shared by every peer-service client.
/// Callers ask `ready()` before dialing and report the outcome back with
/// `record_success` / `record_failure`.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<RwLock<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(BreakerState {
                state: State::Closed,
                consecutive_failures: 0,
                total_calls: 0,
                total_failures: 0,
                opened_at: None,
            })),
        }
    }

    pub async fn state(&self) -> State {
        self.state.read().await.state
    }

    /// Whether a call may go out right now. While open, flips to half-open
    /// once the cool-down has elapsed and lets a single probe through.
    pub async fn ready(&self) -> bool {
        let mut state = self.state.write().await;
        match state.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cool_down)
                    .unwrap_or(false);
                if elapsed {
                    info!("circuit breaker transitioning OPEN -> HALF_OPEN");
                    state.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.total_calls += 1;
        state.consecutive_failures = 0;
        if state.state == State::HalfOpen {
            info!("circuit breaker transitioning HALF_OPEN -> CLOSED");
            state.state = State::Closed;
            state.total_calls = 0;
            state.total_failures = 0;
            state.opened_at = None;
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.total_calls += 1;
        state.total_failures += 1;
        state.consecutive_failures += 1;

        if state.state == State::HalfOpen {
            warn!("circuit breaker transitioning HALF_OPEN -> OPEN (probe failed)");
            state.state = State::Open;
            state.opened_at = Some(Instant::now());
            return;
        }

        let tripped = match self.config.policy {
            TripPolicy::Consecutive { failures } => state.consecutive_failures >= failures,
            TripPolicy::ErrorRate { rate, threshold } => {
                state.total_calls >= threshold
                    && (state.total_failures as f64 / state.total_calls as f64) >= rate
            }
        };

        if tripped && state.state == State::Closed {
            warn!(
                consecutive = state.consecutive_failures,
                total_calls = state.total_calls,
                total_failures = state.total_failures,
                "circuit breaker transitioning CLOSED -> OPEN"
            );
            state.state = State::Open;
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consecutive(failures: u32, cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            policy: TripPolicy::Consecutive { failures },
            cool_down,
        })
    }

    #[tokio::test]
    async fn stays_closed_below_consecutive_threshold() {
        let breaker = consecutive(3, Duration::from_secs(60));

        breaker.record_failure().await;
        breaker.record_failure().await;

        assert!(breaker.ready().await);
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let breaker = consecutive(3, Duration::from_secs(60));

        for _ in 0..3 {
            breaker.record_failure().await;
        }

        assert_eq!(breaker.state().await, State::Open);
        assert!(!breaker.ready().await);
    }

    #[tokio::test]
    async fn success_resets_the_consecutive_count() {
        let breaker = consecutive(3, Duration::from_secs(60));

        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        breaker.record_failure().await;

        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn error_rate_trips_only_past_the_call_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            policy: TripPolicy::ErrorRate {
                rate: 0.5,
                threshold: 4,
            },
            cool_down: Duration::from_secs(60),
        });

        // 1/2 failures: ratio met but not enough calls observed yet.
        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, State::Closed);

        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn half_open_probe_closes_on_success() {
        let breaker = consecutive(1, Duration::from_millis(20));

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.ready().await);
        assert_eq!(breaker.state().await, State::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_reopens_on_failure() {
        let breaker = consecutive(1, Duration::from_millis(20));

        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.ready().await);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, State::Open);
        assert!(!breaker.ready().await);
    }
}
