//! # Freightline Client
//!
//! HTTP client for the Freightline logistics backend: a generic request
//! wrapper around one pooled connection, typed CRUD accessors for the five
//! resource collections, and the authenticated-session endpoints.
//!
//! Session credentials are ambient: the wrapped client carries a cookie
//! store, so every request (and nothing else) transports the session. The
//! accessor layer applies an explicit failure policy — reads degrade,
//! writes propagate — documented in [`resources`].
//!
//! ```rust,no_run
//! use freightline_client::ApiClient;
//! use freightline_core::config::ApiConfig;
//!
//! # async fn example() -> Result<(), freightline_client::ApiError> {
//! let client = ApiClient::new(&ApiConfig::default())?;
//! let shipments = client.shipments().list().await;
//! println!("{} shipments", shipments.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod http;
pub mod resources;

pub use auth::SignupRequest;
pub use http::{ApiClient, ApiError};
pub use resources::{Collection, Resource};
