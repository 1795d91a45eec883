use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{OracleError, OracleResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Shared client builder; the per-request timeout is the adapter's own
/// ceiling, the cycle applies its own time box on top.
pub(crate) fn build_client(timeout: Duration) -> OracleResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(OracleError::from)
}

/// Map a non-success status into the error the cycle should record.
pub(crate) fn check_status(service: &str, status: reqwest::StatusCode) -> OracleResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(OracleError::RateLimited(format!("{service}: {status}")));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(OracleError::NoData(format!("{service}: {status}")));
    }
    Err(OracleError::ServiceUnavailable(format!("{service}: Status: {status}")))
}

/// Sliding-window request limiter: at most `max_requests` per `window`.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    service: &'static str,
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(service: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            service,
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Wait for a free slot and claim it.
    pub(crate) async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let Some(&oldest) = ts.front() else {
                ts.push_back(now);
                return;
            };
            let wait = (oldest + self.window).duration_since(now);
            drop(ts);
            tracing::debug!("{}: waiting {:?} for a request slot", self.service, wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_requests_spaced_by_window() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_allowed_up_to_limit() {
        let limiter = RateLimiter::new("test", 5, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status("svc", reqwest::StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("svc", reqwest::StatusCode::TOO_MANY_REQUESTS),
            Err(OracleError::RateLimited(_))
        ));
        assert!(matches!(
            check_status("svc", reqwest::StatusCode::NOT_FOUND),
            Err(OracleError::NoData(_))
        ));
        assert!(matches!(
            check_status("svc", reqwest::StatusCode::BAD_GATEWAY),
            Err(OracleError::ServiceUnavailable(_))
        ));
    }
}
