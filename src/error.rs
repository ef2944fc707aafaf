use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use crate::ws::error::{CloseError, HandshakeMetadata, WsError};

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Operation attempted while no connection is bound to the adapter
    NotBound,
    /// Dial attempted while a connection is already bound
    AlreadyBound,
    /// The caller's cancellation token fired before the operation completed
    Context,
    /// Opening handshake failed, nothing was bound
    Connection,
    /// I/O or protocol failure on a bound connection that is not a close
    Transport,
    /// The session ended, locally or remotely
    Close,
    /// Caller input rejected before it reached the transport
    Validation,
}

impl Kind {
    /// Whether a fresh dial is needed before the adapter can be used again.
    #[must_use]
    pub const fn requires_redial(self) -> bool {
        matches!(self, Self::NotBound | Self::Close)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// Close details when the session ended.
    pub fn close(&self) -> Option<&CloseError> {
        self.downcast_ref::<CloseError>()
    }

    /// Server answer to a rejected upgrade, when the failure carried one.
    pub fn handshake(&self) -> Option<&HandshakeMetadata> {
        match self.downcast_ref::<WsError>()? {
            WsError::Handshake { metadata, .. } => metadata.as_ref(),
            _ => None,
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    #[must_use]
    pub fn not_bound(operation: Operation) -> Self {
        NotBound { operation }.into()
    }

    #[must_use]
    pub fn cancelled(operation: Operation) -> Self {
        Cancelled { operation }.into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Adapter operation named in error messages.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Dial,
    Write,
    Read,
    Ping,
    Close,
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct NotBound {
    pub operation: Operation,
}

impl fmt::Display for NotBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed because no connection is up", self.operation)
    }
}

impl StdError for NotBound {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct AlreadyBound;

impl fmt::Display for AlreadyBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a connection has already been established")
    }
}

impl StdError for AlreadyBound {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct Cancelled {
    pub operation: Operation,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cancelled before completion", self.operation)
    }
}

impl StdError for Cancelled {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<NotBound> for Error {
    fn from(err: NotBound) -> Self {
        Error::with_source(Kind::NotBound, err)
    }
}

impl From<AlreadyBound> for Error {
    fn from(err: AlreadyBound) -> Self {
        Error::with_source(Kind::AlreadyBound, err)
    }
}

impl From<Cancelled> for Error {
    fn from(err: Cancelled) -> Self {
        Error::with_source(Kind::Context, err)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}
