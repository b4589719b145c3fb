//! Resource records exchanged with the logistics backend.
//!
//! Field names follow the backend's JSON (camelCase). Every record carries
//! an optional server-assigned identifier; the companion `*Draft` types are
//! the creation/update payloads and omit the identifier and the
//! server-managed timestamps entirely, so "no id before creation" is a
//! property of the type rather than a convention.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A shipment moving goods from an origin to a destination.
///
/// May reference an assigned [`Route`] and [`Vendor`] and own a list of
/// [`Cargo`] items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    /// Server-assigned identifier, absent before creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<i64>,
    pub origin: String,
    pub destination: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_vendor: Option<Vendor>,
    /// Optional unique tracking code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cargo_items: Option<Vec<Cargo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Creation/replacement payload for a [`Shipment`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDraft {
    pub origin: String,
    pub destination: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_vendor: Option<Vendor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_code: Option<String>,
}

/// One cargo item, belonging to at most one shipment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cargo {
    /// Server-assigned identifier, absent before creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cargo_id: Option<i64>,
    /// Owning shipment, when the server expands the relation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<Box<Shipment>>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    /// Declared value of the goods.
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// Creation/replacement payload for a [`Cargo`] item.
///
/// References the owning shipment by bare id, never by nested record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CargoDraft {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<i64>,
}

/// A vendor referenced by shipments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    /// Server-assigned identifier, absent before creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,
    pub name: String,
    pub contact_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// e.g. "Logistics", "Shipping Line".
    pub service_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// Creation/replacement payload for a [`Vendor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorDraft {
    pub name: String,
    pub contact_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub service_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// A route between two ports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Server-assigned identifier, absent before creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<i64>,
    pub origin_port: String,
    pub destination_port: String,
    /// Distance in kilometers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Transit duration in days.
    pub duration: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// e.g. "Sea", "Air", "Land", "Rail".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transportation_mode: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Creation/replacement payload for a [`Route`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDraft {
    pub origin_port: String,
    pub destination_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub duration: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transportation_mode: Option<String>,
    pub status: String,
}

/// A completed (or pending) delivery of one shipment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Server-assigned identifier, absent before creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<Shipment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_delivery_date: Option<NaiveDateTime>,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// Creation/replacement payload for a [`Delivery`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<Shipment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_delivery_date: Option<NaiveDateTime>,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Authenticated user as reported by the backend session endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Authentication provider, "local" or "google".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
