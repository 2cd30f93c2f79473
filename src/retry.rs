// =============================================================================
// Retry policy & cancellation token
// =============================================================================
//
// Spec §9 Design Notes: "Retry/backoff mixed into call sites -> a single
// retry policy object parameterised by {max_attempts, backoff(fn_of_attempt)}"
// and "Signal traps modifying instance flags -> a cancellation token".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self { max_attempts, backoff: Arc::new(backoff) }
    }

    /// The historical fetcher's policy: progressive 60s/90s backoff, max 2
    /// retries (spec §5 timeouts table).
    pub fn historical_fetch() -> Self {
        Self::new(2, |attempt| match attempt {
            1 => Duration::from_secs(60),
            _ => Duration::from_secs(90),
        })
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    /// Run `op` up to `max_attempts + 1` times, sleeping per `backoff`
    /// between attempts, until it returns `Ok` or a non-retryable error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && e.is_locally_recoverable() => {
                    attempt += 1;
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Cheap `Arc<AtomicBool>` wrapper; OS signal handlers only set the token,
/// never an instance flag directly.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
