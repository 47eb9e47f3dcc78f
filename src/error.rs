//! Error taxonomy for framelink endpoints.
//!
//! Construction-time failures (`EndpointError`) are fatal to the instance and
//! surface synchronously. Per-call transport results (`RecvError`,
//! `SendError`) are absorbed by the serve loop: a timeout is an expected
//! polling outcome, not a fault, and a single bad send never stops the loop.

use std::io;

use thiserror::Error;

/// Errors raised while opening or starting an endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The configured address could not be parsed as a transport address.
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),
    /// Binding the listener failed.
    #[error("bind failed for {address}: {source}")]
    BindFailed {
        /// Address the bind was attempted on.
        address: String,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// Dialing the remote endpoint failed.
    #[error("connect failed for {address}: {source}")]
    ConnectFailed {
        /// Address the connection was attempted to.
        address: String,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// The server loop or monitor loop was already started.
    #[error("endpoint is already running")]
    AlreadyRunning,
    /// Any other transport-level failure during setup.
    #[error("endpoint I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Per-call receive outcome.
#[derive(Debug, Error)]
pub enum RecvError {
    /// No complete message arrived within the receive timeout.
    #[error("receive timed out")]
    Timeout,
    /// The transport was torn down mid-call.
    #[error("socket closed")]
    Closed,
    /// Transport-level read failure.
    #[error("receive I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Per-call send outcome.
#[derive(Debug, Error)]
pub enum SendError {
    /// The message could not be queued within the send timeout.
    #[error("send timed out")]
    Timeout,
    /// No peer is connected, or the transport was torn down mid-call.
    #[error("socket closed")]
    Closed,
    /// Transport-level write failure.
    #[error("send I/O error: {0}")]
    Io(#[from] io::Error),
}
