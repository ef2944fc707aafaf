#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::correlator::Correlator;
use super::error::{CloseError, HandshakeMetadata, WsError};
use super::traits::ConnectionAdapter;
use crate::Result;
use crate::error::{AlreadyBound, Error, Operation};
use crate::types::{MessageType, StatusCode};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a pending ping is told: `Ok` for a pong, the close otherwise.
type PongNotification = std::result::Result<(), CloseError>;

/// A close frame carries at most 125 bytes, two of which hold the status code.
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Snapshot of the bound connection, as returned by
/// [`ConnectionAdapter::underlying_connection`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct UnderlyingConnection {
    /// Incremented by every successful dial on the same adapter
    pub session: u64,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
    /// Whether the stream runs over TLS (`wss://`)
    pub tls: bool,
    /// Server answer to the opening handshake
    pub handshake: HandshakeMetadata,
}

impl UnderlyingConnection {
    fn inspect(session: u64, stream: &WsStream, handshake: HandshakeMetadata) -> Self {
        let (tcp, tls) = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => (Some(tcp), false),
            MaybeTlsStream::Rustls(tls) => (Some(tls.get_ref().0), true),
            _ => (None, false),
        };

        Self {
            session,
            local_addr: tcp.and_then(|tcp| tcp.local_addr().ok()),
            peer_addr: tcp.and_then(|tcp| tcp.peer_addr().ok()),
            tls,
            handshake,
        }
    }
}

/// Reactions to inbound control frames, installed when a connection is bound.
///
/// Tungstenite surfaces pong and close frames to whoever drives the stream, so
/// the read path invokes these while it drains the socket. Each session owns
/// its ping queue: a reader still draining an older session never reaches the
/// pings of the current one.
#[derive(Clone)]
struct ControlHandlers {
    pings: Arc<Correlator<PongNotification>>,
}

impl ControlHandlers {
    /// One pong satisfies the oldest ping still waiting.
    fn on_pong(&self) {
        let delivered = self.pings.notify_first_active(Ok(()));
        #[cfg(feature = "tracing")]
        tracing::trace!(delivered, "Received WebSocket pong");
        #[cfg(not(feature = "tracing"))]
        let _ = delivered;
    }

    /// The end of the session releases every waiting ping.
    fn on_close(&self, close: &CloseError) {
        let released = self.pings.notify_all_active(&Err(close.clone()));
        #[cfg(feature = "tracing")]
        tracing::debug!(%close, origin = %close.origin, released, "WebSocket session ended");
        #[cfg(not(feature = "tracing"))]
        let _ = released;
    }
}

struct Bound {
    session: u64,
    sink: SplitSink<WsStream, Message>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
    handlers: ControlHandlers,
    underlying: UnderlyingConnection,
}

/// [`ConnectionAdapter`] backed by `tokio-tungstenite`.
///
/// The adapter holds at most one connection. `dial` binds it; `close`, or a
/// close observed by `read`, unbinds it so the next `dial` can proceed.
/// Pending pings belong to the session they were sent on.
///
/// # Example
///
/// ```rust, no_run
/// use std::sync::Arc;
///
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
/// use wsconn_adapter::types::{MessageType, StatusCode};
/// use wsconn_adapter::ws::{ConnectionAdapter as _, TungsteniteConnectionAdapter};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let adapter = Arc::new(TungsteniteConnectionAdapter::default());
///     let token = CancellationToken::new();
///
///     adapter.dial(&token, &Url::parse("wss://echo.websocket.org")?).await?;
///
///     let reader = Arc::clone(&adapter);
///     let read_token = token.clone();
///     tokio::spawn(async move {
///         while let Ok((kind, payload)) = reader.read(&read_token).await {
///             println!("{kind}: {}", String::from_utf8_lossy(&payload));
///         }
///     });
///
///     adapter.write(&token, MessageType::Text, b"hello".to_vec()).await?;
///     adapter.ping(&token).await?;
///     adapter.close(&token, StatusCode::NORMAL_CLOSURE, Some("bye")).await?;
///
///     Ok(())
/// }
/// ```
pub struct TungsteniteConnectionAdapter {
    config: Config,
    /// Bound connection. The lock also serializes every frame written.
    conn: Mutex<Option<Bound>>,
    sessions: AtomicU64,
}

impl Default for TungsteniteConnectionAdapter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl TungsteniteConnectionAdapter {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
            sessions: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Pings of the bound session queued for a pong, including ones whose
    /// caller already gave up. Zero when unbound.
    pub async fn pending_pings(&self) -> usize {
        self.conn
            .lock()
            .await
            .as_ref()
            .map_or(0, |bound| bound.handlers.pings.pending())
    }

    async fn lock(
        &self,
        token: &CancellationToken,
        operation: Operation,
    ) -> Result<MutexGuard<'_, Option<Bound>>> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::cancelled(operation)),
            guard = self.conn.lock() => Ok(guard),
        }
    }

    fn request(&self, target: &Url) -> Result<Request> {
        let mut request = target
            .as_str()
            .into_client_request()
            .map_err(WsError::handshake)?;

        let headers = request.headers_mut();
        for (name, value) in &self.config.request_headers {
            headers.append(name, value.clone());
        }

        Ok(request)
    }

    async fn handshake(&self, request: Request) -> Result<(WsStream, Response)> {
        let connect = connect_async_with_config(
            request,
            Some(self.config.websocket),
            self.config.disable_nagle,
        );

        let connected = match self.config.connect_timeout {
            Some(limit) => timeout(limit, connect)
                .await
                .map_err(|_elapsed| WsError::HandshakeTimeout(limit))?,
            None => connect.await,
        };

        connected.map_err(|e| WsError::handshake(e).into())
    }

    /// Write a control frame, bounded by the configured deadline.
    async fn send_control(
        token: &CancellationToken,
        sink: &mut SplitSink<WsStream, Message>,
        message: Message,
        limit: Duration,
        operation: Operation,
    ) -> Result<()> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::cancelled(operation)),
            sent = timeout(limit, sink.send(message)) => match sent {
                Ok(sent) => sent.map_err(|e| WsError::Transport(e).into()),
                Err(_elapsed) => Err(WsError::WriteTimeout(limit).into()),
            },
        }
    }

    /// Send a ping on `session`, failing if another session replaced it.
    async fn send_ping(&self, token: &CancellationToken, session: u64) -> Result<()> {
        let mut conn = self.lock(token, Operation::Ping).await?;
        let bound = conn
            .as_mut()
            .filter(|bound| bound.session == session)
            .ok_or_else(|| Error::not_bound(Operation::Ping))?;

        Self::send_control(
            token,
            &mut bound.sink,
            Message::Ping(Default::default()),
            self.config.control_write_timeout,
            Operation::Ping,
        )
        .await
    }

    /// Release the pings of `session` and drop its connection after the peer
    /// ended it.
    ///
    /// A newer session bound in the meantime is left alone.
    async fn unbind(&self, session: u64, handlers: &ControlHandlers, close: &CloseError) {
        let taken = {
            let mut conn = self.conn.lock().await;
            // Under the lock, so no ping can register on this session afterwards
            handlers.on_close(close);
            if conn.as_ref().is_some_and(|bound| bound.session == session) {
                conn.take()
            } else {
                None
            }
        };

        if let Some(mut bound) = taken {
            // Flushes the close reply tungstenite queued for the peer
            _ = timeout(self.config.control_write_timeout, bound.sink.close()).await;
        }
    }
}

/// Errors meaning the peer went away without completing the closing handshake.
fn is_abrupt_end(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

#[async_trait]
impl ConnectionAdapter for TungsteniteConnectionAdapter {
    type Underlying = UnderlyingConnection;

    async fn dial(&self, token: &CancellationToken, target: &Url) -> Result<HandshakeMetadata> {
        let mut conn = self.lock(token, Operation::Dial).await?;
        if conn.is_some() {
            return Err(AlreadyBound.into());
        }

        let request = self.request(target)?;
        let connected = tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::cancelled(Operation::Dial)),
            connected = self.handshake(request) => connected,
        };

        let (stream, response) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%target, error = %e, "Unable to connect");
                return Err(e);
            }
        };

        let handshake = HandshakeMetadata::from_response(&response);
        let session = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        let underlying = UnderlyingConnection::inspect(session, &stream, handshake.clone());
        let (sink, stream) = stream.split();

        *conn = Some(Bound {
            session,
            sink,
            stream: Arc::new(Mutex::new(stream)),
            handlers: ControlHandlers {
                pings: Arc::new(Correlator::new(self.config.max_pending_pings)),
            },
            underlying,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(%target, session, status = %handshake.status, "WebSocket connection established");

        Ok(handshake)
    }

    async fn write(
        &self,
        token: &CancellationToken,
        kind: MessageType,
        payload: Vec<u8>,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::cancelled(Operation::Write));
        }

        let message = match kind {
            MessageType::Text => {
                let text = String::from_utf8(payload).map_err(|e| {
                    Error::validation(format!("text payload is not valid UTF-8: {e}"))
                })?;
                Message::text(text)
            }
            MessageType::Binary => Message::binary(payload),
        };

        let mut conn = self.lock(token, Operation::Write).await?;
        let bound = conn
            .as_mut()
            .ok_or_else(|| Error::not_bound(Operation::Write))?;

        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::cancelled(Operation::Write)),
            sent = bound.sink.send(message) => sent.map_err(|e| WsError::Transport(e).into()),
        }
    }

    async fn read(&self, token: &CancellationToken) -> Result<(MessageType, Vec<u8>)> {
        // Snapshot under the lock, then read without it so writers are not blocked
        let (session, source, handlers) = {
            let conn = self.lock(token, Operation::Read).await?;
            let bound = conn
                .as_ref()
                .ok_or_else(|| Error::not_bound(Operation::Read))?;
            (
                bound.session,
                Arc::clone(&bound.stream),
                bound.handlers.clone(),
            )
        };

        let mut stream = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::cancelled(Operation::Read)),
            stream = source.lock() => stream,
        };

        let close = loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return Err(Error::cancelled(Operation::Read)),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok((MessageType::Text, Vec::from(text.as_str())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok((MessageType::Binary, data.to_vec()));
                }
                Some(Ok(Message::Pong(_))) => handlers.on_pong(),
                Some(Ok(Message::Close(frame))) => break CloseError::remote(frame.as_ref()),
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) if is_abrupt_end(&e) => break CloseError::abnormal(Some(e)),
                Some(Err(e)) => return Err(WsError::Transport(e).into()),
                None => break CloseError::abnormal(None),
            }
        };

        drop(stream);
        self.unbind(session, &handlers, &close).await;

        Err(close.into())
    }

    async fn ping(&self, token: &CancellationToken) -> Result<()> {
        let (session, pings) = {
            let conn = self.lock(token, Operation::Ping).await?;
            let bound = conn
                .as_ref()
                .ok_or_else(|| Error::not_bound(Operation::Ping))?;
            (bound.session, Arc::clone(&bound.handlers.pings))
        };

        // Registered before the frame goes out so an early pong finds its waiter
        let mut waiter = pings
            .register(token)
            .await
            .ok_or_else(|| Error::cancelled(Operation::Ping))?;

        if let Err(e) = self.send_ping(token, session).await {
            // The session may have ended between registration and sending
            if let Some(Err(close)) = waiter.try_recv() {
                return Err(close.into());
            }
            drop(waiter);
            pings.prune();
            return Err(e);
        }

        let reply = tokio::select! {
            biased;
            () = token.cancelled() => None,
            reply = waiter.recv() => Some(reply),
        };

        match reply {
            Some(Some(Ok(()))) => Ok(()),
            Some(Some(Err(close))) => Err(close.into()),
            Some(None) => Err(Error::not_bound(Operation::Ping)),
            None => {
                pings.prune();
                Err(Error::cancelled(Operation::Ping))
            }
        }
    }

    async fn close(
        &self,
        token: &CancellationToken,
        code: StatusCode,
        reason: Option<&str>,
    ) -> Result<()> {
        // Not raced against the token: teardown happens even on a cancelled one
        let mut conn = self.conn.lock().await;
        let bound = conn
            .as_mut()
            .ok_or_else(|| Error::not_bound(Operation::Close))?;

        let reason = reason.unwrap_or_default();
        let sent = if reason.len() > MAX_CLOSE_REASON_BYTES {
            Err(Error::validation(format!(
                "close reason is {} bytes, a close frame fits {MAX_CLOSE_REASON_BYTES}",
                reason.len()
            )))
        } else {
            let frame = CloseFrame {
                code: code.into(),
                reason: reason.to_owned().into(),
            };
            Self::send_control(
                token,
                &mut bound.sink,
                Message::Close(Some(frame)),
                self.config.control_write_timeout,
                Operation::Close,
            )
            .await
        };

        // Tungstenite only reports closes initiated by the peer, so waiters
        // are released here for the local side
        bound.handlers.on_close(&CloseError::local(code, reason));
        *conn = None;

        #[cfg(feature = "tracing")]
        if let Err(e) = &sent {
            tracing::warn!(error = %e, "Close frame could not be sent, connection dropped");
        }

        sent
    }

    async fn underlying_connection(&self) -> Option<UnderlyingConnection> {
        self.conn
            .lock()
            .await
            .as_ref()
            .map(|bound| bound.underlying.clone())
    }
}
