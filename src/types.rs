//! Shared value types of the connection contract.

use std::fmt;

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Kind of an application data frame.
///
/// Control frames (ping, pong, close) are handled by the adapter and never
/// surface as a [`MessageType`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MessageType {
    /// UTF-8 text frame
    Text,
    /// Binary frame
    Binary,
}

/// WebSocket close status code (RFC 6455 section 7.4).
///
/// Any `u16` can be represented; the registered codes are exposed as constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    /// Purpose of the connection has been fulfilled.
    pub const NORMAL_CLOSURE: Self = Self(1000);
    /// Endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: Self = Self(1001);
    /// Endpoint terminated the connection due to a protocol error.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Endpoint received a type of data it cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// No status code was present in the close frame. Never sent on the wire.
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    /// Connection dropped without a close frame. Never sent on the wire.
    pub const ABNORMAL_CLOSURE: Self = Self(1006);
    /// Message data was inconsistent with its type (e.g. non UTF-8 text).
    pub const INVALID_FRAME_PAYLOAD_DATA: Self = Self(1007);
    /// Message violated the endpoint's policy.
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// Message was too big to process.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    /// Client expected the server to negotiate an extension.
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    /// Server hit an unexpected condition.
    pub const INTERNAL_SERVER_ERROR: Self = Self(1011);
    /// Server is restarting.
    pub const SERVICE_RESTART: Self = Self(1012);
    /// Server is overloaded, try again later.
    pub const TRY_AGAIN_LATER: Self = Self(1013);
    /// TLS handshake failed. Never sent on the wire.
    pub const TLS_HANDSHAKE: Self = Self(1015);

    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Short description of a registered code, `None` for anything else.
    #[must_use]
    pub const fn description(self) -> Option<&'static str> {
        let text = match self.0 {
            1000 => "normal",
            1001 => "going away",
            1002 => "protocol error",
            1003 => "unsupported data",
            1005 => "no status",
            1006 => "abnormal closure",
            1007 => "invalid payload data",
            1008 => "policy violation",
            1009 => "message too big",
            1010 => "mandatory extension missing",
            1011 => "internal server error",
            1012 => "service restart",
            1013 => "try again later",
            1015 => "TLS handshake error",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "{} ({text})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}

impl From<CloseCode> for StatusCode {
    fn from(code: CloseCode) -> Self {
        Self(code.into())
    }
}

impl From<StatusCode> for CloseCode {
    fn from(code: StatusCode) -> Self {
        CloseCode::from(code.0)
    }
}
