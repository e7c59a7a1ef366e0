//! Read pump: delivers inbound payloads and watches for a silent link.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connectors::{Frame, FrameStream};
use crate::error::LinkError;

/// Why a read pump returned.
#[derive(Debug)]
pub(crate) enum LinkEnd {
    /// The link token was cancelled.
    Cancelled,
    /// The remote closed the link.
    Closed,
    /// Nothing arrived within the idle timeout.
    Idle,
    Failed(LinkError),
}

/// Reads frames until the link ends, handing each payload to `on_data`.
///
/// With an idle timeout set, any inbound frame (heartbeats included) resets
/// the deadline; if it expires the link is considered dead.
pub(crate) async fn read_pump<F>(
    mut stream: FrameStream,
    idle_timeout: Option<Duration>,
    mut on_data: F,
    cancel: CancellationToken,
) -> LinkEnd
where
    F: FnMut(Bytes),
{
    let idle_deadline = tokio::time::sleep(idle_timeout.unwrap_or_default());
    tokio::pin!(idle_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return LinkEnd::Cancelled,

            () = &mut idle_deadline, if idle_timeout.is_some() => {
                warn!("no traffic within idle timeout, dropping link");
                return LinkEnd::Idle;
            }

            frame = stream.next() => {
                if let Some(idle) = idle_timeout {
                    idle_deadline.as_mut().reset(Instant::now() + idle);
                }
                match frame {
                    Some(Ok(Frame::Data(data))) => {
                        trace!(bytes = data.len(), "payload received");
                        on_data(data);
                    }
                    Some(Ok(Frame::Heartbeat)) => trace!("heartbeat received"),
                    Some(Err(e)) => {
                        warn!(error = %e, "link read failed");
                        return LinkEnd::Failed(e);
                    }
                    None => {
                        debug!("link closed by remote");
                        return LinkEnd::Closed;
                    }
                }
            }
        }
    }
}
