//! Reactor, router and request/response limits.
//!
//! # Security-first defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion (slot table, route table, catalog overflow)
//! - Memory overflows
//! - Header / query-parameter flooding
//!
//! # Memory consumption
//!
//! Each active slot consumes memory according to:
//!
//! `Total` = [`Request buffer`](crate::limits::ReqLimits#memory-allocation-strategy) +
//!           [`Response buffer`](crate::limits::RespLimits#buffer-management) +
//!           slot bookkeeping.
//!
//! # Examples
//!
//! ```no_run
//! use reactorhttp::{Reactor, limits::{ReactorLimits, ReqLimits}};
//!
//! let mut reactor = Reactor::builder()
//!     .reactor_limits(ReactorLimits {
//!         max_connections: 2000,
//!         ..ReactorLimits::default()
//!     })
//!     .request_limits(ReqLimits {
//!         header_count: 18,
//!         body_size: 16 * 1024,
//!         ..ReqLimits::default()
//!     })
//!     .open("8080")
//!     .unwrap();
//! ```

use std::time::Duration;

/// Controls the reactor's slot table, route table, and overload behavior.
///
/// There is no worker pool and no connection admission queue: a single
/// thread drives one [`mio::Poll`] tick at a time, so `max_connections`
/// is simply the size of the fixed slot array described in the data model
/// (capacity `C`). A connection that arrives when the table is full is
/// refused at `accept` time rather than queued.
#[derive(Debug, Clone)]
pub struct ReactorLimits {
    /// Size of the fixed connection slot table (default: `1024`).
    ///
    /// `accept()` on a full table is refused; the listening socket stays
    /// registered and will be retried on the next readiness tick.
    pub max_connections: usize,

    /// Bounded capacity of the route table (default: `512`).
    ///
    /// 512 is a generous default for an embedded router; raise it for an
    /// application with an unusually large number of distinct routes.
    pub max_routes: usize,

    /// Bounded capacity of the externally-registered descriptor table
    /// used by `listen_fd` (default: `64`).
    pub max_listeners: usize,

    /// Inactivity deadline applied after an outbound buffer drains
    /// (default: `10 seconds`).
    pub inactivity_deadline: Duration,

    /// Upper bound on the background hook's period (default: `1 second`,
    /// i.e. ~1 Hz, best-effort).
    pub background_period: Duration,

    /// Format for the canned error preambles (default: `false`, plain
    /// `Content-Length: 0` bodies).
    ///
    /// When `true`, error responses carry a small JSON body describing the
    /// failure instead of an empty one.
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReactorLimits {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_routes: 512,
            max_listeners: 64,
            inactivity_deadline: Duration::from_secs(10),
            background_period: Duration::from_secs(1),
            json_errors: false,

            _priv: (),
        }
    }
}

/// Per-slot timeouts and request accounting.
///
/// These do not create background timers: they are checked against a
/// slot's recorded timestamps once per reactor tick, which is why the
/// granularity is "best-effort" rather than exact.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// How long a slot may sit idle (no bytes received) before it is
    /// closed (default: `2 seconds`). Guards against slowloris-style
    /// connections that open and then trickle bytes.
    pub socket_read_timeout: Duration,

    /// How long a slot may have outbound bytes pending without making
    /// write progress before it is closed (default: `3 seconds`).
    pub socket_write_timeout: Duration,

    /// Maximum number of requests served on one connection before it is
    /// closed regardless of `Connection: keep-alive` (default: `10_000`).
    pub max_requests_per_connection: usize,

    /// Hard cap on a connection's lifetime from `accept` to close
    /// (default: `10 minutes`), independent of activity.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            connection_lifetime: Duration::from_secs(600),
            max_requests_per_connection: 10_000,

            _priv: (),
        }
    }
}

/// Limits for the supplemental HTTP/0.9-style compatibility path.
///
/// A request line with no version token is answered with a raw body and
/// no headers; these limits bound how long such a connection may be kept
/// open rather than closed after one exchange.
#[derive(Debug, Clone)]
pub struct Http09Limits {
    /// Maximum requests on one HTTP/0.9 connection before it is closed
    /// (default: `250`).
    pub max_requests_per_connection: usize,

    /// Idle timeout for an HTTP/0.9 connection (default: `30 seconds`).
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for Http09Limits {
    fn default() -> Self {
        Self {
            max_requests_per_connection: 250,
            connection_lifetime: Duration::from_secs(30),
            _priv: (),
        }
    }
}

/// HTTP request parsing limits and buffer pre-allocation strategy.
///
/// **Security-first defaults.** These limits are intentionally
/// conservative. You MAY need to raise them if legitimate requests start
/// seeing `413`/`414`/`431`.
///
/// # Memory allocation strategy
///
/// Each slot pre-allocates a fixed-size read buffer sized from these
/// limits:
///
/// ```text
/// Total Buffer = First Line + (Headers × Header Line) + Body + Overhead
/// ```
///
/// | Component | Formula | Default size |
/// |-----------|---------|------|
/// | First line | `19 + url_size` | 530 B |
/// | Headers | `header_count × Header Line` | 9,280 B |
/// | Header line | `header_name_size + header_value_size + 4` | 580 B |
/// | Body | `body_size` | 4,096 B |
///
/// # Example
/// ```
/// use reactorhttp::limits::ReqLimits;
///
/// let limits = ReqLimits::default();
/// let buffer_size = limits.estimated_buffer_size();
/// println!("each slot needs {buffer_size} bytes for its read buffer");
/// ```
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum method-token length in bytes (default: `63`, the data
    /// model's documented method ceiling). Methods are not restricted to
    /// a fixed set; any token up to this length is accepted and classified
    /// by [`Method::from_bytes`](crate::Method).
    pub method_size: usize,
    /// Maximum URI length in bytes, path + query (default: `511`, the
    /// data model's documented URI ceiling).
    pub url_size: usize,
    /// Maximum number of `/`-delimited path segments (default: `16`).
    pub url_parts: usize,
    /// Maximum query-string length including the leading `?` (default: `256`).
    pub url_query_size: usize,
    /// Maximum number of `key=value` query pairs (default: `16`).
    pub url_query_parts: usize,

    /// Maximum number of header lines per request (default: `32`).
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `64`).
    pub header_name_size: usize,
    /// Maximum header value length in bytes (default: `512`).
    pub header_value_size: usize,

    /// Maximum request body size accepted in the synchronous path
    /// (default: `8 KiB`); larger declared bodies require an async route.
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub precalc: ReqLimitsPrecalc,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            method_size: 63,
            url_size: 511,
            url_parts: 16,
            url_query_size: 256,
            url_query_parts: 16,

            header_count: 32,
            header_name_size: 64,
            header_value_size: 512,

            body_size: 8 * 1024,

            precalc: ReqLimitsPrecalc::default(),
        }
    }
}

impl ReqLimits {
    /// Estimated per-slot read-buffer size these limits require.
    #[inline(always)]
    pub fn estimated_buffer_size(self) -> usize {
        self.precalculate().precalc.buffer
    }

    #[inline(always)]
    pub(crate) fn precalculate(mut self) -> Self {
        self.precalc.first_line = self.first_line();
        self.precalc.h_line = self.h_line();
        self.precalc.buffer = self.buffer();
        self.precalc.req_without_body = self.precalc.buffer - self.body_size;

        self
    }

    #[inline(always)]
    fn buffer(&self) -> usize {
        self.precalc.first_line + self.header_count * self.precalc.h_line + 2 + self.body_size
    }

    #[inline(always)]
    // METHOD /url/test HTTP/1.1\r\n  ->  method + " " + url + " " + Version(8) + "\r\n"
    fn first_line(&self) -> usize {
        self.method_size + self.url_size + 11
    }

    #[inline(always)]
    // Name: Value\r\n  ->  name + ": " + value + "\r\n"
    fn h_line(&self) -> usize {
        self.header_name_size + self.header_value_size + 4
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Default)]
pub struct ReqLimitsPrecalc {
    pub(crate) buffer: usize,
    pub(crate) first_line: usize,
    pub(crate) req_without_body: usize,
    pub(crate) h_line: usize,
}

/// Response buffer allocation limits.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity allocated per outbound response (default: `1024`).
    pub default_capacity: usize,
    /// Buffers larger than this are replaced rather than retained across
    /// requests on the same slot (default: `8192`).
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}
