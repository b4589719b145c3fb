//! Topics and the notifications they produce.
//!
//! The broker exposes one topic per resource kind. Incoming messages are
//! republished locally as [`Notification`]s whose event name follows the
//! `{topic}-updated` convention consumers key their refresh logic on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const DESTINATION_PREFIX: &str = "/topic/";

/// A push-message channel, 1:1 with the five resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Shipments,
    Deliveries,
    Routes,
    Cargo,
    Vendors,
}

impl Topic {
    /// The fixed subscription set, in subscription order.
    pub const ALL: [Self; 5] = [
        Self::Shipments,
        Self::Deliveries,
        Self::Routes,
        Self::Cargo,
        Self::Vendors,
    ];

    /// Bare topic name, broker prefix stripped.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shipments => "shipments",
            Self::Deliveries => "deliveries",
            Self::Routes => "routes",
            Self::Cargo => "cargo",
            Self::Vendors => "vendors",
        }
    }

    /// Broker destination, e.g. `/topic/shipments`.
    pub fn destination(self) -> &'static str {
        match self {
            Self::Shipments => "/topic/shipments",
            Self::Deliveries => "/topic/deliveries",
            Self::Routes => "/topic/routes",
            Self::Cargo => "/topic/cargo",
            Self::Vendors => "/topic/vendors",
        }
    }

    /// Resolve a broker destination back to its topic.
    pub fn from_destination(destination: &str) -> Option<Self> {
        let name = destination
            .strip_prefix(DESTINATION_PREFIX)
            .unwrap_or(destination);
        match name {
            "shipments" => Some(Self::Shipments),
            "deliveries" => Some(Self::Deliveries),
            "routes" => Some(Self::Routes),
            "cargo" => Some(Self::Cargo),
            "vendors" => Some(Self::Vendors),
            _ => None,
        }
    }

    /// Name of the local update event for this topic.
    pub fn event_name(self) -> String {
        format!("{}-updated", self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-local record of one received push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic the message arrived on.
    pub topic: Topic,
    /// Raw payload text, passed through untouched.
    pub payload: String,
    /// Local receipt time.
    pub received_at: DateTime<Utc>,
}

impl Notification {
    /// Name of the local update event this notification is dispatched as.
    pub fn event_name(&self) -> String {
        self.topic.event_name()
    }
}
