//! Persistence seam toward the store's data layer
//!
//! The data layer itself is outside this subsystem; everything here is
//! get/set semantics keyed by order id and variant id. [`MemoryOrderStore`]
//! is the in-process implementation used in tests and embedding scenarios.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::FulfillmentResult;
use crate::order::{LocalOrder, OrderUpdate};

/// A product mockup image row to persist
#[derive(Debug, Clone, PartialEq)]
pub struct ProductImage {
    /// Provider catalog product the mockups were generated for
    pub external_product_id: i64,
    pub variant_ids: Vec<i64>,
    pub url: String,
    pub placement: Option<String>,
}

/// Order / product-image persistence used by reconciliation and mockup flows
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: Uuid) -> FulfillmentResult<Option<LocalOrder>>;

    async fn find_by_external_order_id(
        &self,
        external_order_id: &str,
    ) -> FulfillmentResult<Option<LocalOrder>>;

    /// Apply a minimal diff to an order
    async fn update_order(&self, id: Uuid, update: &OrderUpdate) -> FulfillmentResult<()>;

    async fn insert_product_image(&self, image: ProductImage) -> FulfillmentResult<()>;
}

/// In-memory [`OrderStore`]
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<Uuid, LocalOrder>,
    images: Mutex<Vec<ProductImage>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: LocalOrder) {
        self.orders.insert(order.id, order);
    }

    pub fn images(&self) -> Vec<ProductImage> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get_order(&self, id: Uuid) -> FulfillmentResult<Option<LocalOrder>> {
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn find_by_external_order_id(
        &self,
        external_order_id: &str,
    ) -> FulfillmentResult<Option<LocalOrder>> {
        Ok(self
            .orders
            .iter()
            .find(|o| o.external_order_id.as_deref() == Some(external_order_id))
            .map(|o| o.clone()))
    }

    async fn update_order(&self, id: Uuid, update: &OrderUpdate) -> FulfillmentResult<()> {
        if let Some(mut order) = self.orders.get_mut(&id) {
            update.apply(&mut order);
        }
        Ok(())
    }

    async fn insert_product_image(&self, image: ProductImage) -> FulfillmentResult<()> {
        self.images.lock().unwrap().push(image);
        Ok(())
    }
}
