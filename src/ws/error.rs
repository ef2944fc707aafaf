#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode as HttpStatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::error::{Error, Kind};
use crate::types::StatusCode;

/// WebSocket transport error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Opening handshake failed
    Handshake {
        source: tungstenite::Error,
        /// Server answer, when the server answered with a non-upgrade response
        metadata: Option<HandshakeMetadata>,
    },
    /// Opening handshake did not finish within the configured connect timeout
    HandshakeTimeout(Duration),
    /// Error communicating over an established connection
    Transport(tungstenite::Error),
    /// A control frame could not be written before its deadline
    WriteTimeout(Duration),
}

impl WsError {
    pub(crate) fn handshake(source: tungstenite::Error) -> Self {
        let metadata = match &source {
            tungstenite::Error::Http(response) => Some(HandshakeMetadata {
                status: response.status(),
                headers: response.headers().clone(),
                body: response.body().clone().map(Into::into),
            }),
            _ => None,
        };
        Self::Handshake { source, metadata }
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake { source, .. } => write!(f, "WebSocket handshake failed: {source}"),
            Self::HandshakeTimeout(limit) => {
                write!(f, "WebSocket handshake did not complete within {limit:?}")
            }
            Self::Transport(e) => write!(f, "WebSocket transport error: {e}"),
            Self::WriteTimeout(limit) => {
                write!(f, "control frame not written within {limit:?}")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Handshake { source, .. } => Some(source),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::Handshake { .. } | WsError::HandshakeTimeout(_) => Kind::Connection,
            WsError::Transport(_) | WsError::WriteTimeout(_) => Kind::Transport,
        };
        Error::with_source(kind, e)
    }
}

/// HTTP side of the opening handshake, kept for diagnostics.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct HandshakeMetadata {
    pub status: HttpStatusCode,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HandshakeMetadata {
    pub(crate) fn from_response(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body().clone().map(Into::into),
        }
    }
}

/// Which side ended the session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOrigin {
    /// The local caller invoked close
    Local,
    /// The peer sent a close frame
    Remote,
    /// The stream ended without a closing handshake
    Abnormal,
}

impl fmt::Display for CloseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "client closed the connection"),
            Self::Remote => write!(f, "close message received from server"),
            Self::Abnormal => write!(f, "connection dropped without a closing handshake"),
        }
    }
}

/// Termination of a WebSocket session.
///
/// Returned by read, ping and close. Every ping pending when the session ends
/// receives its own copy. Equality ignores the underlying cause.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CloseError {
    pub code: StatusCode,
    pub reason: String,
    pub origin: CloseOrigin,
    /// Transport error that ended the stream, for abnormal closures
    cause: Option<Arc<tungstenite::Error>>,
}

impl CloseError {
    #[must_use]
    pub fn new<S: Into<String>>(code: StatusCode, reason: S, origin: CloseOrigin) -> Self {
        Self {
            code,
            reason: reason.into(),
            origin,
            cause: None,
        }
    }

    pub(crate) fn local(code: StatusCode, reason: &str) -> Self {
        Self::new(code, reason, CloseOrigin::Local)
    }

    /// A close frame without payload is reported as 1005 (no status).
    pub(crate) fn remote(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self::new(frame.code.into(), frame.reason.as_str(), CloseOrigin::Remote),
            None => Self::new(StatusCode::NO_STATUS_RECEIVED, "", CloseOrigin::Remote),
        }
    }

    /// The stream ended without a close frame, either cleanly (`None`) or
    /// through `cause`.
    pub(crate) fn abnormal(cause: Option<tungstenite::Error>) -> Self {
        let reason = cause
            .as_ref()
            .map_or_else(|| "stream ended".to_owned(), ToString::to_string);

        Self {
            cause: cause.map(Arc::new),
            ..Self::new(StatusCode::ABNORMAL_CLOSURE, reason, CloseOrigin::Abnormal)
        }
    }
}

impl PartialEq for CloseError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.reason == other.reason && self.origin == other.origin
    }
}

impl Eq for CloseError {}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "websocket: close {}", self.code)?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

impl StdError for CloseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<CloseError> for Error {
    fn from(err: CloseError) -> Self {
        Error::with_source(Kind::Close, err)
    }
}
