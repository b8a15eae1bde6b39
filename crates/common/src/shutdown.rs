use std::time::Duration;

use tokio::sync::watch;

/// Create a stop flag. Workers hold the receiver; flipping the sender to
/// `true` (or dropping it) asks every worker to return.
pub fn stop_flag() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Whether a stop has been requested.
pub fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Sleep for `dur` unless a stop is requested first.
/// Returns `true` when the caller should stop.
pub async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, dur: Duration) -> bool {
    if stop_requested(stop) {
        return true;
    }
    let slept = tokio::select! {
        _ = tokio::time::sleep(dur) => true,
        // Err means the sender is gone, which also counts as stop.
        _ = stop.wait_for(|stop| *stop) => false,
    };
    !slept || stop_requested(stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_interrupts_long_sleep() {
        let (tx, mut rx) = stop_flag();
        let sleeper = tokio::spawn(async move { sleep_or_stop(&mut rx, Duration::from_secs(3600)).await });
        tx.send(true).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("stop not observed")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn short_sleep_completes_without_stop() {
        let (_tx, mut rx) = stop_flag();
        assert!(!sleep_or_stop(&mut rx, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn stop_set_before_sleep_returns_immediately() {
        let (tx, mut rx) = stop_flag();
        tx.send(true).unwrap();
        let stopped = tokio::time::timeout(
            Duration::from_secs(1),
            sleep_or_stop(&mut rx, Duration::from_secs(3600)),
        )
        .await
        .expect("pending stop not observed");
        assert!(stopped);
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_stop() {
        let (tx, mut rx) = stop_flag();
        drop(tx);
        assert!(sleep_or_stop(&mut rx, Duration::from_secs(3600)).await);
    }
}
