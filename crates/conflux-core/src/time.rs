use std::time::Duration;

/// Resolves after `ms` milliseconds.
pub async fn sleep(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[inline]
pub async fn sleep_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Never resolves.
pub async fn forever<T>() -> T {
    std::future::pending().await
}
