use std::time::Duration;

/// Maximum accepted payload size in bytes (4 MB).
pub const MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

/// Default number of events retained in the history buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Time allowed for a connection handshake to complete.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a send waits for room in the outbound queue.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a keepalive heartbeat is queued on an idle link.
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(15);

/// Time to wait for the `OK` line after sending `AUTH` on a TCP link.
pub const TCP_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the per-link outbound queue.
pub const WRITE_QUEUE_CAPACITY: usize = 256;

/// Default reconnect attempts after a failure before giving up.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

/// Initial reconnect delay in seconds.
pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 1.0;

/// Upper bound on the reconnect delay in seconds.
pub const DEFAULT_BACKOFF_CAP_SECS: f64 = 60.0;

/// Relative jitter applied to every reconnect delay (±20%).
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// Line sent by TCP peers to accept an `AUTH` line.
pub const TCP_AUTH_OK: &str = "OK";
