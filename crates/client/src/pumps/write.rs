//! Write pump: drains the outbound queue into the link sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connectors::{Frame, FrameSink};

/// Writes queued frames to the link.
///
/// A write failure cancels `cancel` so the read side notices the dead link.
/// The sink is closed on exit.
pub(crate) async fn write_pump(
    mut sink: FrameSink,
    mut write_rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = write_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = sink.send(frame).await {
                            warn!(error = %e, "link write failed");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "error closing link");
    }
}
