#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::num::NonZeroUsize;
use std::time::Duration;

use bon::Builder;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

const DEFAULT_CONTROL_WRITE_TIMEOUT_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_MAX_PENDING_PINGS: NonZeroUsize = NonZeroUsize::new(10).expect("ten is non-zero");

/// Construction-time configuration of a connection adapter.
///
/// Transport policy (framing limits, Nagle, TLS) is handed to tungstenite as is.
///
/// ```rust
/// use std::time::Duration;
///
/// use wsconn_adapter::ws::config::Config;
///
/// let config = Config::builder()
///     .connect_timeout(Duration::from_secs(10))
///     .disable_nagle(true)
///     .build();
///
/// assert_eq!(config.max_pending_pings.get(), 10);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Headers appended to every opening handshake, e.g. `Origin`,
    /// `Sec-WebSocket-Protocol` or `Cookie`
    #[builder(default)]
    pub request_headers: HeaderMap,
    /// Framing limits and buffer sizes of the underlying tungstenite socket
    #[builder(default)]
    pub websocket: WebSocketConfig,
    /// Disable Nagle's algorithm on the TCP socket
    #[builder(default)]
    pub disable_nagle: bool,
    /// Upper bound on TCP connect, TLS and upgrade together. `None` waits for
    /// the caller's cancellation token only.
    pub connect_timeout: Option<Duration>,
    /// Deadline for writing ping and close control frames
    #[builder(default = DEFAULT_CONTROL_WRITE_TIMEOUT_DURATION)]
    pub control_write_timeout: Duration,
    /// Number of pings that may wait for a pong on one session at the same
    /// time. Further pings block until a slot frees up.
    #[builder(default = DEFAULT_MAX_PENDING_PINGS)]
    pub max_pending_pings: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.control_write_timeout, Duration::from_secs(60));
        assert_eq!(config.max_pending_pings.get(), 10);
        assert!(config.connect_timeout.is_none());
        assert!(config.request_headers.is_empty());
        assert!(!config.disable_nagle);
    }

    #[test]
    fn builder_overrides_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://example.com"));

        let config = Config::builder()
            .request_headers(headers)
            .max_pending_pings(NonZeroUsize::new(2).unwrap())
            .control_write_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(config.max_pending_pings.get(), 2);
        assert_eq!(config.control_write_timeout, Duration::from_secs(5));
        assert_eq!(
            config.request_headers.get("origin"),
            Some(&HeaderValue::from_static("https://example.com"))
        );
    }
}
