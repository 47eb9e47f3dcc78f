#![doc(html_root_url = "https://docs.rs/framelink/latest")]
//! Public API for the `framelink` library.
//!
//! This crate provides supervised, heartbeat-aware framed messaging
//! endpoints: a multipart framed socket, a connection-lifecycle monitor, a
//! request/reply serve loop with cooperative shutdown, and shared counter
//! aggregates consumed by a metrics exporter.

pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod monitor;
pub mod panic;
pub mod server;
pub mod socket;
pub mod stats;

pub use config::{EndpointConfig, HeartbeatAction, SocketMode, SocketRole};
pub use error::{EndpointError, RecvError, SendError};
pub use frame::{Message, MultipartCodec};
pub use handler::{HandlerError, MessageHandler, handler_fn};
pub use monitor::{ConnectionMonitor, LinkState, LinkTable};
pub use server::MessagingServer;
pub use socket::{FramedSocket, SocketEvent, SocketEvents};
pub use stats::{CounterSet, MessagingCounters, ServerCounters, StatsSnapshot};
