//! Typed CRUD accessors for the five resource collections.
//!
//! Every operation follows one explicit failure policy; it is a documented
//! contract of this layer, not an accident of error plumbing:
//!
//! | operation | on failure |
//! |-----------|------------|
//! | `list`    | log at warn, return an empty vec |
//! | `get`     | log at warn, return `None` |
//! | `create`  | propagate unchanged |
//! | `update`  | propagate unchanged |
//! | `delete`  | propagate unchanged |
//!
//! Reads are advisory: a dashboard composed of many widgets must not fall
//! over because one collection fetch failed. Writes must never fail
//! silently — the caller typically confirms success to the user, and that
//! confirmation has to be honest.

use crate::http::{ApiClient, ApiError};
use freightline_core::model::{
    Cargo, CargoDraft, Delivery, DeliveryDraft, Route, RouteDraft, Shipment, ShipmentDraft,
    Vendor, VendorDraft,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// A server-owned resource kind reachable under `/{collection}`.
pub trait Resource: DeserializeOwned + Serialize + Default + Send + Sync {
    /// Collection path segment, e.g. `"shipments"`.
    const COLLECTION: &'static str;
    /// Singular label used in log messages.
    const NAME: &'static str;
    /// Creation/replacement payload; carries no server-assigned identifier.
    type Draft: Serialize + Sync;

    /// Server-assigned identifier, if the record has been persisted.
    fn id(&self) -> Option<i64>;
}

impl Resource for Shipment {
    const COLLECTION: &'static str = "shipments";
    const NAME: &'static str = "shipment";
    type Draft = ShipmentDraft;

    fn id(&self) -> Option<i64> {
        self.shipment_id
    }
}

impl Resource for Vendor {
    const COLLECTION: &'static str = "vendors";
    const NAME: &'static str = "vendor";
    type Draft = VendorDraft;

    fn id(&self) -> Option<i64> {
        self.vendor_id
    }
}

impl Resource for Cargo {
    const COLLECTION: &'static str = "cargo";
    const NAME: &'static str = "cargo";
    type Draft = CargoDraft;

    fn id(&self) -> Option<i64> {
        self.cargo_id
    }
}

impl Resource for Route {
    const COLLECTION: &'static str = "routes";
    const NAME: &'static str = "route";
    type Draft = RouteDraft;

    fn id(&self) -> Option<i64> {
        self.route_id
    }
}

impl Resource for Delivery {
    const COLLECTION: &'static str = "deliveries";
    const NAME: &'static str = "delivery";
    type Draft = DeliveryDraft;

    fn id(&self) -> Option<i64> {
        self.delivery_id
    }
}

/// Accessor handle for one resource collection.
pub struct Collection<'a, R: Resource> {
    client: &'a ApiClient,
    _resource: PhantomData<R>,
}

impl ApiClient {
    /// Accessor handle for an arbitrary resource kind.
    pub fn collection<R: Resource>(&self) -> Collection<'_, R> {
        Collection {
            client: self,
            _resource: PhantomData,
        }
    }

    /// Shipment accessors.
    pub fn shipments(&self) -> Collection<'_, Shipment> {
        self.collection()
    }

    /// Vendor accessors.
    pub fn vendors(&self) -> Collection<'_, Vendor> {
        self.collection()
    }

    /// Cargo accessors.
    pub fn cargo(&self) -> Collection<'_, Cargo> {
        self.collection()
    }

    /// Route accessors.
    pub fn routes(&self) -> Collection<'_, Route> {
        self.collection()
    }

    /// Delivery accessors.
    pub fn deliveries(&self) -> Collection<'_, Delivery> {
        self.collection()
    }
}

impl<R: Resource> Collection<'_, R> {
    fn collection_path() -> String {
        format!("/{}", R::COLLECTION)
    }

    fn item_path(id: i64) -> String {
        format!("/{}/{}", R::COLLECTION, id)
    }

    /// Fetch the whole collection. Degrades to empty on any failure.
    pub async fn list(&self) -> Vec<R> {
        match self.client.get::<Vec<R>>(&Self::collection_path()).await {
            Ok(items) => {
                debug!(resource = R::NAME, count = items.len(), "fetched collection");
                items
            }
            Err(error) => {
                warn!(
                    resource = R::NAME,
                    error = %error,
                    "collection fetch failed; degrading to empty"
                );
                Vec::new()
            }
        }
    }

    /// Fetch one record. Degrades to `None` on any failure.
    pub async fn get(&self, id: i64) -> Option<R> {
        match self.client.get::<R>(&Self::item_path(id)).await {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(
                    resource = R::NAME,
                    id,
                    error = %error,
                    "record fetch failed; degrading to absent"
                );
                None
            }
        }
    }

    /// Create a record from a draft; the server assigns the identifier.
    pub async fn create(&self, draft: &R::Draft) -> Result<R, ApiError> {
        self.client
            .post::<R, R::Draft>(&Self::collection_path(), Some(draft))
            .await
    }

    /// Replace the record with `id` wholesale (no partial patch semantics).
    pub async fn update(&self, id: i64, draft: &R::Draft) -> Result<R, ApiError> {
        self.client.put::<R, R::Draft>(&Self::item_path(id), draft).await
    }

    /// Delete the record with `id`.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete(&Self::item_path(id)).await
    }
}
