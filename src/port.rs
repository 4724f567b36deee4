//! TCP readiness probe
//!
//! Polls `127.0.0.1:<port>` until something accepts a connection. The probe
//! knows nothing about the process behind the port; a dead server simply
//! never opens it and the wait runs into its deadline.

use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

use crate::error::TimeoutError;

const PROBE_HOST: &str = "127.0.0.1";

/// Poll settings for `wait_until_ready`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortWaiter {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PortWaiter {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }
}

impl PortWaiter {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self { poll_interval, timeout }
    }

    pub async fn wait(&self, port: u16) -> Result<(), TimeoutError> {
        wait_until_ready(port, self.poll_interval, self.timeout).await
    }
}

/// Single connect attempt, bounded by `limit`
async fn probe(port: u16, limit: Duration) -> bool {
    matches!(
        timeout(limit, TcpStream::connect((PROBE_HOST, port))).await,
        Ok(Ok(_))
    )
}

/// Wait until `port` accepts a TCP connection.
///
/// Attempts are spaced `poll_interval` apart and the last one is made at the
/// deadline, so this never fails before `limit` has elapsed.
pub async fn wait_until_ready(port: u16, poll_interval: Duration, limit: Duration) -> Result<(), TimeoutError> {
    let started = Instant::now();
    let deadline = started + limit;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        // connect on loopback either succeeds or is refused right away
        let attempt_limit = remaining.max(poll_interval);
        if probe(port, attempt_limit).await {
            debug!("Port {} accepted a connection after {} attempt(s)", port, attempts);
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(TimeoutError {
                port,
                waited: now - started,
            });
        }
        sleep(poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind((PROBE_HOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_ready_immediately_when_listening() {
        let listener = TcpListener::bind((PROBE_HOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = wait_until_ready(port, Duration::from_millis(10), Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_times_out_not_before_deadline() {
        let port = closed_port().await;
        let limit = Duration::from_millis(300);
        let poll = Duration::from_millis(50);

        let started = std::time::Instant::now();
        let err = wait_until_ready(port, poll, limit).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.port, port);
        assert!(elapsed >= limit, "failed early after {:?}", elapsed);
        assert!(elapsed < limit + Duration::from_secs(2), "overran: {:?}", elapsed);
        assert!(err.waited >= limit);
    }

    #[tokio::test]
    async fn test_becomes_ready_once_listener_binds() {
        let port = closed_port().await;

        let binder = tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            let listener = TcpListener::bind((PROBE_HOST, port)).await.unwrap();
            // keep it open long enough for the waiter to see it
            sleep(Duration::from_secs(2)).await;
            drop(listener);
        });

        let started = std::time::Instant::now();
        let waiter = PortWaiter::new(Duration::from_millis(20), Duration::from_secs(5));
        waiter.wait(port).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));

        binder.abort();
    }
}
