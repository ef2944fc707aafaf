//! Contract between a session engine and a concrete WebSocket transport.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::HandshakeMetadata;
use crate::Result;
use crate::types::{MessageType, StatusCode};

/// Single client-side WebSocket connection, shareable between tasks.
///
/// A session engine typically dials once, runs [`read`](Self::read) in a
/// dedicated task, and calls [`write`](Self::write), [`ping`](Self::ping) and
/// [`close`](Self::close) from elsewhere. Control frames only make progress
/// while some task is reading, so a ping without a concurrent read loop never
/// sees its pong.
///
/// Every method returns promptly with [`Kind::Context`](crate::error::Kind::Context)
/// once its `token` is cancelled. [`close`](Self::close) still tears the
/// connection down in that case.
#[async_trait]
pub trait ConnectionAdapter: Send + Sync + 'static {
    /// Transport-specific view of the bound connection.
    type Underlying: Send + Sync;

    /// Open a connection and perform the opening handshake.
    ///
    /// Fails with [`Kind::AlreadyBound`](crate::error::Kind::AlreadyBound) if a
    /// connection is bound, whatever its health. On handshake failure nothing is
    /// bound and the server answer, if any, is available through
    /// [`Error::handshake`](crate::error::Error::handshake).
    async fn dial(&self, token: &CancellationToken, target: &Url) -> Result<HandshakeMetadata>;

    /// Send a data frame. Writers are serialized.
    async fn write(
        &self,
        token: &CancellationToken,
        kind: MessageType,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Wait for the next data frame, answering control frames on the way.
    ///
    /// A close frame (or an abrupt end of stream) unbinds the connection and is
    /// returned as a [`CloseError`](super::error::CloseError). Only one task may
    /// read at a time.
    async fn read(&self, token: &CancellationToken) -> Result<(MessageType, Vec<u8>)>;

    /// Send a ping and wait for the matching pong.
    ///
    /// Resolves with a [`CloseError`](super::error::CloseError) if the session
    /// ends while the ping is pending.
    async fn ping(&self, token: &CancellationToken) -> Result<()>;

    /// Send a close frame, release pending pings and unbind the connection.
    ///
    /// The connection is unbound even when the close frame could not be sent,
    /// including when `token` is already cancelled; that failure is still
    /// returned. Only sending the frame is bounded by `token`.
    async fn close(
        &self,
        token: &CancellationToken,
        code: StatusCode,
        reason: Option<&str>,
    ) -> Result<()>;

    /// Escape hatch to the bound connection, `None` when unbound.
    async fn underlying_connection(&self) -> Option<Self::Underlying>;
}
