//! Server configuration: limits, timeouts and protocol switches
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Slowloris attacks
//! - Header flooding
//!
//! Every struct implements [`Default`]; change only the fields you need:
//!
//! ```no_run
//! use duet_http::{Server, Service, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .bind("127.0.0.1:8080".parse().unwrap())?
//!         .handler(Service::new())
//!         .server_limits(ServerLimits {
//!             max_connections: 5000, // Higher concurrency
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             max_pipelined_requests: 8,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 64,
//!             body_size: 16 * 1024 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

/// Controls server-level concurrency, queueing, and overload behavior.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue has room? | ====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [--------]   Yes   /--------------------------\   No   [------]
/// [ Worker ] <====== | Is there a free worker?  | =====> [ Wait ]
/// [--------]         \--------------------------/        [------]
/// ```
///
/// Workers are long-lived tasks created once by
/// [`Server::launch`](crate::Server::launch). Each one takes a
/// connection from the queue and drives it until it closes. Handlers run in
/// their own tasks, so a slow handler never blocks its worker from flushing
/// earlier responses.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. concurrently served connections (default: `100`).
    pub max_connections: usize,

    /// Maximum number of accepted connections waiting for a worker (default: `250`).
    ///
    /// When the queue is full, new connections get an immediate `503`.
    pub max_pending_connections: usize,

    /// How idle workers wait for the next connection (default: `Sleep(50μs)`).
    pub wait_strategy: WaitStrategy,

    /// Tasks answering queue overflow with `503` (default: `1`).
    ///
    /// Set to 0 to close overflowing connections silently.
    pub count_503_handlers: usize,

    /// Format for canned error responses (default: `true`).
    ///
    /// If `true`:
    /// ```text
    /// HTTP/1.1 413 Payload Too Large\r
    /// connection: close\r
    /// content-length: 58\r
    /// content-type: application/json\r
    /// \r
    /// {"error":"Request body too large","code":"BODY_TOO_LARGE"}
    /// ```
    /// If `false`, the same status line with an empty body.
    pub json_errors: bool,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,
            json_errors: true,

            _priv: (),
        }
    }
}

/// Strategy for worker tasks waiting on an empty connection queue.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin with [`tokio::task::yield_now()`]. Lowest latency, burns a core.
    Yield,
    /// Poll with [`tokio::time::sleep()`] between attempts.
    Sleep(Duration),
}

/// Per-connection limits and timeouts.
///
/// These are the server's timeout policy; the protocol state machines
/// themselves never time out.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum idle time waiting for request bytes (default: `5 seconds`).
    ///
    /// Only applies while no response is outstanding, so slow handlers are
    /// not cut off by it.
    pub socket_read_timeout: Duration,

    /// Maximum duration of a single socket write (default: `10 seconds`).
    pub socket_write_timeout: Duration,

    /// Requests served on one connection before it is closed (default: `1000`).
    pub max_requests_per_connection: usize,

    /// Maximum lifetime of a connection (default: `10 minutes`).
    ///
    /// Checked between requests; the response in progress is never cut.
    pub connection_lifetime: Duration,

    /// Pipelined requests dispatched ahead of their responses (default: `1`).
    ///
    /// With `1` the next request is parsed only after the previous response
    /// completed. Larger values let handlers run concurrently; responses are
    /// still written in request order.
    pub max_pipelined_requests: usize,

    /// Size of a single socket read (default: `8 KiB`).
    pub read_buffer_size: usize,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(5),
            socket_write_timeout: Duration::from_secs(10),
            max_requests_per_connection: 1000,
            connection_lifetime: Duration::from_secs(600),
            max_pipelined_requests: 1,
            read_buffer_size: 8 * 1024,

            _priv: (),
        }
    }
}

/// Request parsing limits.
///
/// Exceeding a size limit answers with a canned `413`, `414` or `431` and
/// closes the connection; framing errors close it without a response.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum request line length, terminator excluded (default: `8 KiB`).
    pub request_line_size: usize,

    /// Maximum length of one header, trailer or chunk-size line (default: `8 KiB`).
    pub header_line_size: usize,

    /// Maximum number of header plus trailer fields (default: `100`).
    pub header_count: usize,

    /// Maximum decoded body size (default: `8 MiB`).
    pub body_size: usize,

    /// Require `\r\n` line endings (default: `false`).
    ///
    /// The lenient default also accepts bare `\n` and skips any whitespace
    /// before a request line. In strict mode only empty `\r\n` lines are
    /// skipped between requests and a bare `\n` is a framing error.
    pub strict_line_endings: bool,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            request_line_size: 8 * 1024,
            header_line_size: 8 * 1024,
            header_count: 100,
            body_size: 8 * 1024 * 1024,
            strict_line_endings: false,

            _priv: (),
        }
    }
}

/// Response writing limits.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Buffer used when streaming a [`Device`](crate::Device) (default: `128 KiB`).
    ///
    /// Reading from the device pauses while more than half of this is
    /// still waiting to be written to the peer.
    pub stream_buffer_size: usize,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            stream_buffer_size: 128 * 1024,

            _priv: (),
        }
    }
}

impl RespLimits {
    /// Outstanding byte count above which producers wait.
    #[inline(always)]
    pub(crate) fn high_water(&self) -> usize {
        (self.stream_buffer_size / 2).max(1)
    }
}

/// HTTP/2 settings.
///
/// Plaintext connections starting with the HTTP/2 connection preface
/// (`PRI * HTTP/2.0`) are served as HTTP/2 when `enabled` is set.
#[derive(Debug, Clone)]
pub struct Http2Limits {
    /// Accept prior-knowledge HTTP/2 (default: `true`).
    pub enabled: bool,

    /// `SETTINGS_MAX_CONCURRENT_STREAMS` (default: `100`).
    pub max_concurrent_streams: u32,

    /// `SETTINGS_INITIAL_WINDOW_SIZE` for every stream (default: `65535`).
    ///
    /// Values above `2^31 - 1` are lowered to it.
    pub initial_window_size: u32,

    /// `SETTINGS_MAX_FRAME_SIZE` (default: `16384`).
    ///
    /// Clamped to the protocol range `16384..=16777215`.
    pub max_frame_size: u32,

    #[doc(hidden)]
    pub _priv: (),
}

impl Default for Http2Limits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_streams: 100,
            initial_window_size: 65_535,
            max_frame_size: 16_384,

            _priv: (),
        }
    }
}

impl Http2Limits {
    pub(crate) const MIN_FRAME_SIZE: u32 = 16_384;
    pub(crate) const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;
    pub(crate) const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;

    #[inline(always)]
    pub(crate) fn frame_size(&self) -> u32 {
        self.max_frame_size.clamp(Self::MIN_FRAME_SIZE, Self::MAX_FRAME_SIZE)
    }

    #[inline(always)]
    pub(crate) fn window_size(&self) -> u32 {
        self.initial_window_size.min(Self::MAX_WINDOW_SIZE)
    }
}
