use anyhow::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Whether a failed request is worth another attempt.
pub fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status()
        .is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
}

/// Exponential backoff with full jitter for the given attempt (1-based).
pub fn backoff_delay(attempt: usize, base_delay_ms: u64) -> Duration {
    let exp = base_delay_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jitter = if capped == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=capped / 2)
    };
    Duration::from_millis(capped / 2 + jitter)
}

/// Retries an async operation on transient failures
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Base delay, doubled on every further attempt and jittered
///
/// # Returns
/// Either the successful result or the last error
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries || !is_transient(&err) {
                    return Err(err.into());
                }
                let delay = backoff_delay(attempt, delay_ms);
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, retries, err, delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Keeps consecutive requests at least `min_interval` apart.
pub struct RequestPacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        RequestPacer {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
