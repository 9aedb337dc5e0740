//! Inbound provider webhook events
//!
//! Delivery is at-least-once: duplicate and unresolvable events are routine,
//! so every path here logs and drops instead of raising. A shipped webhook
//! is treated as authoritative — unlike polling reconciliation it bypasses
//! the terminal-status guard.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::Shipment;
use crate::order::{LocalOrder, LocalOrderStatus, OrderUpdate};
use crate::reconcile::OrderLocks;
use crate::store::OrderStore;

/// A decoded provider webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub order: Option<WebhookOrder>,
    #[serde(default)]
    pub shipment: Option<Shipment>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Order reference carried by an event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookOrder {
    pub id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Routes provider events onto local order updates
pub struct WebhookDispatcher {
    store: Arc<dyn OrderStore>,
    locks: Arc<OrderLocks>,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<dyn OrderStore>, locks: Arc<OrderLocks>) -> Self {
        Self { store, locks }
    }

    /// Handle one raw event. Never fails: malformed, unrecognized and
    /// unresolvable events are logged and dropped; redelivery is the
    /// provider's responsibility.
    pub async fn handle(&self, raw: Value) {
        let event: WebhookEvent = match serde_json::from_value(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed webhook payload");
                return;
            }
        };

        match event.event_type.as_str() {
            "package_shipped" => self.on_package_shipped(&event).await,
            "order_failed" => {
                self.on_order_terminated(&event, LocalOrderStatus::FulfillmentFailed)
                    .await
            }
            "order_canceled" => {
                self.on_order_terminated(&event, LocalOrderStatus::FulfillmentCanceled)
                    .await
            }
            other => {
                tracing::debug!(event_type = other, "Ignoring unhandled webhook event type");
            }
        }
    }

    async fn on_package_shipped(&self, event: &WebhookEvent) {
        let Some((order, provider_order)) = self.resolve_order(event).await else {
            return;
        };

        let lock = self.locks.for_order(order.id);
        let _guard = lock.lock().await;

        // The resolve snapshot was taken before the lock; re-read so the
        // diff is computed against what a racing sync may have written
        let Some(order) = self.reread(order.id).await else {
            return;
        };

        // Shipped webhooks are authoritative: no terminal guard here
        let mut update = OrderUpdate::default();
        if order.status != LocalOrderStatus::Shipped {
            update.status = Some(LocalOrderStatus::Shipped);
        }
        if order.external_order_id.is_none() {
            update.external_order_id = Some(provider_order.id.to_string());
        }
        if let Some(shipment) = &event.data.shipment {
            if let Some(tracking_number) = shipment.tracking() {
                if order.tracking_number.as_deref() != Some(tracking_number) {
                    update.tracking_number = Some(tracking_number.to_string());
                }
                if shipment.tracking_url.is_some() && order.tracking_url != shipment.tracking_url {
                    update.tracking_url = shipment.tracking_url.clone();
                }
                if shipment.carrier.is_some() && order.carrier != shipment.carrier {
                    update.carrier = shipment.carrier.clone();
                }
            }
        }

        self.persist(order.id, update, "package_shipped").await;
    }

    async fn on_order_terminated(&self, event: &WebhookEvent, status: LocalOrderStatus) {
        let Some((order, _)) = self.resolve_order(event).await else {
            return;
        };

        tracing::warn!(
            order_id = %order.id,
            event_type = %event.event_type,
            reason = event.data.reason.as_deref().unwrap_or("unspecified"),
            "Provider reported order termination"
        );

        let lock = self.locks.for_order(order.id);
        let _guard = lock.lock().await;

        let Some(order) = self.reread(order.id).await else {
            return;
        };

        // Failure/cancellation are side branches; unlike package_shipped
        // they never pull an order out of a terminal status
        if order.status.is_terminal() {
            tracing::debug!(
                order_id = %order.id,
                status = %order.status,
                event_type = %event.event_type,
                "Ignoring termination event for order in terminal status"
            );
            return;
        }

        let mut update = OrderUpdate::default();
        if order.status != status {
            update.status = Some(status);
        }
        self.persist(order.id, update, &event.event_type).await;
    }

    /// Fresh read of an order under the caller-held per-order lock
    async fn reread(&self, order_id: Uuid) -> Option<LocalOrder> {
        match self.store.get_order(order_id).await {
            Ok(Some(order)) => Some(order),
            Ok(None) => {
                tracing::warn!(order_id = %order_id, "Order vanished between resolve and update");
                None
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Order re-read failed, dropping webhook event");
                None
            }
        }
    }

    /// Resolve the event to a local order: stored provider order id first,
    /// then the event's external id when it is UUID-shaped
    async fn resolve_order(&self, event: &WebhookEvent) -> Option<(LocalOrder, WebhookOrder)> {
        let provider_order = match &event.data.order {
            Some(order) => order.clone(),
            None => {
                tracing::warn!(
                    event_type = %event.event_type,
                    "Dropping webhook event without an order reference"
                );
                return None;
            }
        };

        match self
            .store
            .find_by_external_order_id(&provider_order.id.to_string())
            .await
        {
            Ok(Some(order)) => return Some((order, provider_order)),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Order lookup failed, dropping webhook event");
                return None;
            }
        }

        if let Some(external_id) = &provider_order.external_id {
            if let Ok(local_id) = Uuid::parse_str(external_id) {
                match self.store.get_order(local_id).await {
                    Ok(Some(order)) => return Some((order, provider_order)),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Order lookup failed, dropping webhook event");
                        return None;
                    }
                }
            }
        }

        tracing::warn!(
            event_type = %event.event_type,
            provider_order_id = provider_order.id,
            external_id = provider_order.external_id.as_deref().unwrap_or(""),
            "Dropping webhook event for unknown order"
        );
        None
    }

    async fn persist(&self, order_id: Uuid, update: OrderUpdate, event_type: &str) {
        if update.is_empty() {
            tracing::debug!(order_id = %order_id, event_type, "Webhook event was a no-op");
            return;
        }
        match self.store.update_order(order_id, &update).await {
            Ok(()) => {
                tracing::info!(
                    order_id = %order_id,
                    event_type,
                    changed = ?update.changed_fields(),
                    "Order updated from webhook"
                );
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, event_type, error = %e, "Failed to persist webhook update");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrderStore;
    use serde_json::json;

    fn setup(order: LocalOrder) -> (Arc<MemoryOrderStore>, WebhookDispatcher, Uuid) {
        let id = order.id;
        let store = Arc::new(MemoryOrderStore::new());
        store.insert_order(order);
        let dispatcher = WebhookDispatcher::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::new(OrderLocks::new()),
        );
        (store, dispatcher, id)
    }

    fn shipped_event(provider_order_id: i64, external_id: &str) -> Value {
        json!({
            "type": "package_shipped",
            "data": {
                "order": {"id": provider_order_id, "external_id": external_id},
                "shipment": {
                    "tracking_number": "TRACK123",
                    "tracking_url": "https://track.example/TRACK123",
                    "carrier": "FedEx"
                }
            }
        })
    }

    #[tokio::test]
    async fn package_shipped_sets_status_and_tracking() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Processing);
        order.external_order_id = Some("5550".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher.handle(shipped_event(5550, "ignored")).await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Shipped);
        assert_eq!(order.tracking_number.as_deref(), Some("TRACK123"));
        assert_eq!(order.carrier.as_deref(), Some("FedEx"));
    }

    #[tokio::test]
    async fn package_shipped_is_idempotent() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Processing);
        order.external_order_id = Some("5550".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher.handle(shipped_event(5550, "ignored")).await;
        let first = store.get_order(id).await.unwrap().unwrap();
        dispatcher.handle(shipped_event(5550, "ignored")).await;
        let second = store.get_order(id).await.unwrap().unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.tracking_number, second.tracking_number);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn shipped_webhook_overrides_terminal_status() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Delivered);
        order.external_order_id = Some("5550".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher.handle(shipped_event(5550, "ignored")).await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Shipped);
    }

    #[tokio::test]
    async fn falls_back_to_uuid_shaped_external_id() {
        let order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        let (store, dispatcher, id) = setup(order);

        // Provider order id is unknown locally; external id is our UUID
        dispatcher.handle(shipped_event(9999, &id.to_string())).await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Shipped);
        // Provider order id is recorded for future lookups
        assert_eq!(order.external_order_id.as_deref(), Some("9999"));
    }

    #[tokio::test]
    async fn unresolvable_event_is_dropped_without_panic() {
        let order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        let (store, dispatcher, id) = setup(order);

        dispatcher
            .handle(shipped_event(123456, "not-a-uuid"))
            .await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Paid);
    }

    #[tokio::test]
    async fn order_failed_sets_failure_status_with_reason() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Processing);
        order.external_order_id = Some("777".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher
            .handle(json!({
                "type": "order_failed",
                "data": {
                    "order": {"id": 777},
                    "reason": "Printing file is corrupt"
                }
            }))
            .await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::FulfillmentFailed);
    }

    #[tokio::test]
    async fn order_canceled_sets_cancellation_status() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        order.external_order_id = Some("778".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher
            .handle(json!({
                "type": "order_canceled",
                "data": {"order": {"id": 778}, "reason": "Out of stock"}
            }))
            .await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::FulfillmentCanceled);
    }

    #[tokio::test]
    async fn termination_events_never_overwrite_terminal_statuses() {
        for (terminal, event_type) in [
            (LocalOrderStatus::Delivered, "order_failed"),
            (LocalOrderStatus::Refunded, "order_canceled"),
            (LocalOrderStatus::Cancelled, "order_failed"),
        ] {
            let mut order = LocalOrder::new(Uuid::new_v4(), terminal);
            order.external_order_id = Some("900".into());
            let (store, dispatcher, id) = setup(order);

            dispatcher
                .handle(json!({
                    "type": event_type,
                    "data": {"order": {"id": 900}, "reason": "late event"}
                }))
                .await;

            let order = store.get_order(id).await.unwrap().unwrap();
            assert_eq!(order.status, terminal, "{event_type} must not touch {terminal}");
        }
    }

    #[tokio::test]
    async fn shipped_webhook_serializes_on_the_order_lock() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Processing);
        order.external_order_id = Some("5550".into());
        let id = order.id;
        let store = Arc::new(MemoryOrderStore::new());
        store.insert_order(order);
        let locks = Arc::new(OrderLocks::new());
        let dispatcher = Arc::new(WebhookDispatcher::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::clone(&locks),
        ));

        // Simulate a sync holding this order's lock
        let lock = locks.for_order(id);
        let guard = lock.lock().await;

        let handle = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.handle(shipped_event(5550, "ignored")).await }
        });

        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Processing, "no write while locked");

        drop(guard);
        handle.await.unwrap();
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Shipped);
    }

    #[tokio::test]
    async fn shipped_webhook_diffs_against_a_fresh_read() {
        // A store whose order lookup returns a stale pre-shipment snapshot
        // while the keyed read reflects a sync that already landed
        struct StaleLookupStore {
            inner: MemoryOrderStore,
            stale: LocalOrder,
        }

        #[async_trait::async_trait]
        impl OrderStore for StaleLookupStore {
            async fn get_order(
                &self,
                id: Uuid,
            ) -> crate::error::FulfillmentResult<Option<LocalOrder>> {
                self.inner.get_order(id).await
            }
            async fn find_by_external_order_id(
                &self,
                _external_order_id: &str,
            ) -> crate::error::FulfillmentResult<Option<LocalOrder>> {
                Ok(Some(self.stale.clone()))
            }
            async fn update_order(
                &self,
                id: Uuid,
                update: &crate::order::OrderUpdate,
            ) -> crate::error::FulfillmentResult<()> {
                self.inner.update_order(id, update).await
            }
            async fn insert_product_image(
                &self,
                image: crate::store::ProductImage,
            ) -> crate::error::FulfillmentResult<()> {
                self.inner.insert_product_image(image).await
            }
        }

        let mut stale = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Processing);
        stale.external_order_id = Some("5550".into());
        let id = stale.id;

        let mut fresh = stale.clone();
        fresh.status = LocalOrderStatus::Shipped;
        fresh.tracking_number = Some("TRACK123".into());
        fresh.tracking_url = Some("https://track.example/TRACK123".into());
        fresh.carrier = Some("FedEx".into());

        let inner = MemoryOrderStore::new();
        inner.insert_order(fresh.clone());
        let store = Arc::new(StaleLookupStore { inner, stale });
        let dispatcher = WebhookDispatcher::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::new(OrderLocks::new()),
        );

        dispatcher.handle(shipped_event(5550, "ignored")).await;

        // The event repeats what the fresh record already holds: the diff
        // must come out empty instead of rewriting from the stale snapshot
        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.updated_at, fresh.updated_at);
    }

    #[tokio::test]
    async fn unrecognized_event_types_are_ignored() {
        let mut order = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        order.external_order_id = Some("779".into());
        let (store, dispatcher, id) = setup(order);

        dispatcher
            .handle(json!({
                "type": "stock_updated",
                "data": {"order": {"id": 779}}
            }))
            .await;
        dispatcher.handle(json!({"not even": "an event"})).await;

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, LocalOrderStatus::Paid);
    }
}
