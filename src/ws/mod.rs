//! WebSocket connection adapter.
//!
//! # Architecture
//!
//! - [`ConnectionAdapter`]: contract a session engine drives (dial, write, read, ping, close)
//! - [`TungsteniteConnectionAdapter`]: implementation over `tokio-tungstenite`
//! - [`Correlator`]: hands pongs and closes observed by the read path to waiting pings
//!
//! # Example
//!
//! ```ignore
//! let adapter = Arc::new(TungsteniteConnectionAdapter::new(config));
//! adapter.dial(&token, &url).await?;
//!
//! // Control frames are only processed while someone reads
//! tokio::spawn(read_loop(Arc::clone(&adapter), token.clone()));
//!
//! adapter.ping(&token).await?;
//! ```

pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod traits;

pub use connection::{TungsteniteConnectionAdapter, UnderlyingConnection};
pub use correlator::{Correlator, Waiter};
pub use error::{CloseError, CloseOrigin, HandshakeMetadata};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
