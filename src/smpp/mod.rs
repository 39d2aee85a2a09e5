//! SMPP 3.4 client stack.
//!
//! Wire layer (codec, PDUs, framed connection), the bound client session,
//! the per-tenant connection pool and the delivery-receipt correlator.

pub mod client;
pub mod codec;
pub mod connection;
pub mod correlator;
pub mod dlr;
pub mod pdu;
pub mod pool;

pub use client::{ClientStatus, SmppClient, SubmitOutcome};
pub use codec::{CodecError, CommandId, CommandStatus};
pub use correlator::DlrCorrelator;
pub use dlr::{Dlr, DlrStatus};
pub use pool::{PoolError, PooledClient, SmppPool};

/// Errors raised by the SMPP client stack.
#[derive(Debug, thiserror::Error)]
pub enum SmppError {
    #[error("connect timed out")]
    ConnectTimeout,

    #[error("response timed out")]
    ResponseTimeout,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("session closed")]
    SessionClosed,

    #[error("bind rejected: {0}")]
    BindRejected(CommandStatus),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
