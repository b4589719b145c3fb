//! # Freightline Realtime
//!
//! Subscription client for the backend's push-message broker. The broker
//! speaks STOMP over WebSocket and exposes one topic per resource kind;
//! this crate owns the connection lifecycle and republishes incoming
//! messages as local `{topic}-updated` notification streams.
//!
//! ## Modules
//!
//! - [`frame`]: STOMP 1.2 client framing
//! - [`topic`]: topics and notification records
//! - [`log`]: bounded arrival-ordered notification ring
//! - [`reconnect`]: bounded retry accounting for broker-level errors
//! - [`transport`]: broker transport seam + WebSocket implementation
//! - [`session`]: the owned realtime session and its driver
//!
//! ```rust,no_run
//! use freightline_core::config::RealtimeConfig;
//! use freightline_realtime::{RealtimeSession, Topic};
//!
//! # async fn example() -> Result<(), freightline_realtime::RealtimeError> {
//! let session = RealtimeSession::new(RealtimeConfig::default())?;
//! let mut shipments = session.subscribe(Topic::Shipments);
//! session.connect();
//!
//! while let Ok(notification) = shipments.recv().await {
//!     println!("{}: {}", notification.event_name(), notification.payload);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod log;
pub mod reconnect;
pub mod session;
pub mod topic;
pub mod transport;

pub use error::RealtimeError;
pub use log::MessageLog;
pub use reconnect::ReconnectPolicy;
pub use session::{ConnectionState, RealtimeSession, SessionEvent};
pub use topic::{Notification, Topic};
pub use transport::{BrokerLink, BrokerTransport, WebSocketTransport};
