//! Async test helpers
//!
//! Timeout wrappers for channels and watch receivers, so a broken
//! listener fails the test instead of hanging it.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

/// Default timeout duration for tests (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Short timeout for asserting that nothing arrives (100ms)
pub const SHORT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    #[error("receive operation timed out")]
    Timeout,
    #[error("channel closed")]
    Closed,
}

/// Receive from an unbounded channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Collect exactly `count` items, each within `per_item_timeout`
pub async fn collect_n<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    count: usize,
    per_item_timeout: Duration,
) -> Result<Vec<T>, RecvTimeoutError> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(recv_timeout(rx, per_item_timeout).await?);
    }
    Ok(items)
}

/// Wait until the watched value satisfies `predicate`, returning a clone of it
pub async fn wait_for_watch<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    match timeout(DEFAULT_TEST_TIMEOUT, rx.wait_for(predicate)).await {
        Ok(Ok(value)) => value.clone(),
        Ok(Err(_)) => panic!("watch sender dropped before condition was met"),
        Err(_) => panic!("condition not met within {:?}", DEFAULT_TEST_TIMEOUT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_timeout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(42).unwrap();
        assert_eq!(recv_timeout(&mut rx, DEFAULT_TEST_TIMEOUT).await, Ok(42));
        assert_eq!(
            recv_timeout(&mut rx, SHORT_TEST_TIMEOUT).await,
            Err(RecvTimeoutError::Timeout)
        );

        drop(tx);
        assert_eq!(
            recv_timeout(&mut rx, DEFAULT_TEST_TIMEOUT).await,
            Err(RecvTimeoutError::Closed)
        );
    }

    #[tokio::test]
    async fn test_wait_for_watch() {
        let (tx, mut rx) = watch::channel(0);
        tokio::spawn(async move {
            for i in 1..=3 {
                tx.send_replace(i);
                tokio::task::yield_now().await;
            }
        });
        assert_eq!(wait_for_watch(&mut rx, |v| *v == 3).await, 3);
    }
}
