//! Ping pump: periodic heartbeats on an otherwise quiet link.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::connectors::Frame;

/// Queues a heartbeat every `period` until cancelled or the queue closes.
///
/// A full queue skips the beat; queued traffic keeps the link alive anyway.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<Frame>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match write_tx.try_send(Frame::Heartbeat) {
                    Ok(()) => trace!("heartbeat queued"),
                    Err(TrySendError::Full(_)) => trace!("write queue full, skipping heartbeat"),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_pump_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            ping_pump(tx, Duration::from_secs(15), c).await;
        });

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }

    #[tokio::test(start_paused = true)]
    async fn sends_heartbeat_each_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ping_pump(tx, Duration::from_secs(10), cancel.clone()));

        // Nothing before the first period elapses.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, Some(Frame::Heartbeat));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rx.recv().await, Some(Frame::Heartbeat));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_queue_closes() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            ping_pump(tx, Duration::from_millis(10), cancel),
        )
        .await
        .expect("should stop once the receiver is gone");
    }
}
