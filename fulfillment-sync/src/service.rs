//! Operation-level contract exposed to the UI/action layer
//!
//! Everything the storefront needs from the fulfillment integration goes
//! through [`FulfillmentService`]: placing and confirming provider orders,
//! pull-based status sync, mockup generation, and webhook ingestion.

use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::client::{
    CreateOrderRequest, FulfillmentClient, OrderItem, ProviderOrderStatus, Recipient,
};
use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::order::{LocalOrderStatus, OrderUpdate};
use crate::poller::TaskPoller;
use crate::reconcile::{OrderLocks, ReconciliationEngine, SyncOutcome};
use crate::store::{OrderStore, ProductImage};

/// Result of placing a fulfillment order
#[derive(Debug, Clone)]
pub struct CreateOrderOutcome {
    pub external_order_id: String,
    pub provider_status: ProviderOrderStatus,
}

/// Result of confirming a draft order
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub provider_status: ProviderOrderStatus,
    /// Whether the local mirror was advanced; `false` with overall success
    /// means the next sync will repair it
    pub local_updated: bool,
}

/// Fulfillment synchronization façade
pub struct FulfillmentService {
    client: Arc<FulfillmentClient>,
    store: Arc<dyn OrderStore>,
    locks: Arc<OrderLocks>,
    engine: ReconciliationEngine,
    poller: TaskPoller,
    dispatcher: crate::webhook::WebhookDispatcher,
}

impl FulfillmentService {
    pub fn new(config: &FulfillmentConfig, store: Arc<dyn OrderStore>) -> Self {
        Self::with_client(Arc::new(FulfillmentClient::new(config)), store)
    }

    /// Assemble the service around an existing client (tests inject a
    /// scripted transport this way)
    pub fn with_client(client: Arc<FulfillmentClient>, store: Arc<dyn OrderStore>) -> Self {
        let locks = Arc::new(OrderLocks::new());
        let engine =
            ReconciliationEngine::new(Arc::clone(&client), Arc::clone(&store), Arc::clone(&locks));
        let dispatcher =
            crate::webhook::WebhookDispatcher::new(Arc::clone(&store), Arc::clone(&locks));
        let poller = TaskPoller::new(Arc::clone(&client));
        Self {
            client,
            store,
            locks,
            engine,
            poller,
            dispatcher,
        }
    }

    /// Mirror a paid local order into the provider. `external_id` is the
    /// idempotency key (derived from the local order id); resubmitting with
    /// the same key never creates a duplicate provider order.
    pub async fn create_fulfillment_order(
        &self,
        recipient: Recipient,
        items: Vec<OrderItem>,
        external_id: String,
        confirm_immediately: bool,
    ) -> FulfillmentResult<CreateOrderOutcome> {
        let request = CreateOrderRequest {
            external_id,
            recipient,
            items,
        };
        let order = self.client.create_order(&request, confirm_immediately).await?;

        tracing::info!(
            external_order_id = order.id,
            provider_status = %order.status,
            confirmed = confirm_immediately,
            "Fulfillment order created"
        );

        // Record the provider order id on the local mirror right away so
        // webhooks can resolve it
        if let Ok(local_id) = Uuid::parse_str(&request.external_id) {
            let update = OrderUpdate {
                external_order_id: Some(order.id.to_string()),
                ..OrderUpdate::default()
            };
            if let Err(e) = self.store.update_order(local_id, &update).await {
                tracing::warn!(order_id = %local_id, error = %e, "Provider order created but local link failed; next sync will repair");
            }
        }

        Ok(CreateOrderOutcome {
            external_order_id: order.id.to_string(),
            provider_status: order.status,
        })
    }

    /// Confirm a draft order, committing the store to production cost.
    /// Refused unless the provider's current status is exactly `draft`.
    pub async fn confirm_fulfillment_order(
        &self,
        external_order_id: &str,
    ) -> FulfillmentResult<ConfirmOutcome> {
        let current = self.client.get_order(external_order_id).await?;
        if current.status != ProviderOrderStatus::Draft {
            return Err(FulfillmentError::Api {
                status: 409,
                reason: "not_a_draft".into(),
                message: format!(
                    "cannot confirm order {external_order_id}: provider status is \"{}\", only draft orders can be confirmed",
                    current.status
                ),
            });
        }

        let confirmed = self.client.confirm_order(external_order_id).await?;
        tracing::info!(
            external_order_id,
            provider_status = %confirmed.status,
            "Fulfillment order confirmed"
        );

        // Confirmation means "accepted into the fulfillment queue", not
        // "dispatched": the local order advances to processing
        let local_updated = match self
            .store
            .find_by_external_order_id(external_order_id)
            .await
        {
            Ok(Some(order)) => self.advance_to_processing(order.id, external_order_id).await,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(external_order_id, error = %e, "Confirmed at provider but local lookup failed");
                false
            }
        };

        Ok(ConfirmOutcome {
            provider_status: confirmed.status,
            local_updated,
        })
    }

    /// Advance a confirmed order's local mirror to `processing` under the
    /// per-order lock. Only pre-fulfillment statuses advance: a racing
    /// shipped webhook or a terminal status must never be rolled back.
    async fn advance_to_processing(&self, order_id: Uuid, external_order_id: &str) -> bool {
        let lock = self.locks.for_order(order_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; the pre-lock lookup may be stale
        let order = match self.store.get_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(external_order_id, error = %e, "Confirmed at provider but local lookup failed");
                return false;
            }
        };

        if !matches!(
            order.status,
            LocalOrderStatus::Pending | LocalOrderStatus::Paid
        ) {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status,
                "Confirmed at provider; local status already past paid, leaving it"
            );
            return false;
        }

        let update = OrderUpdate {
            status: Some(LocalOrderStatus::Processing),
            ..OrderUpdate::default()
        };
        match self.store.update_order(order_id, &update).await {
            Ok(()) => true,
            Err(e) => {
                // Provider already committed; the mirror is repaired by the
                // next sync
                tracing::warn!(
                    external_order_id,
                    error = %e,
                    "Confirmed at provider but local status write failed"
                );
                false
            }
        }
    }

    /// Pull the provider's current order state and reconcile it into the
    /// local record
    pub async fn sync_order_status(&self, local_order_id: Uuid) -> FulfillmentResult<SyncOutcome> {
        self.engine.sync_order_status(local_order_id).await
    }

    /// Generate mockups for a catalog product, one task per color group,
    /// and persist the rendered images. Tasks that fail or time out are
    /// skipped; the count of stored images is returned.
    pub async fn generate_mockups(
        &self,
        external_product_id: i64,
        image_url: &str,
    ) -> FulfillmentResult<usize> {
        let product = self.client.get_catalog_product(external_product_id).await?;
        if product.variants.is_empty() {
            return Err(FulfillmentError::not_found(format!(
                "variants for product {external_product_id}"
            )));
        }

        // One mockup task per color; variants without a color go together
        let mut groups: Vec<(Option<String>, Vec<i64>)> = Vec::new();
        for variant in &product.variants {
            match groups.iter_mut().find(|(color, _)| *color == variant.color) {
                Some((_, ids)) => ids.push(variant.id),
                None => groups.push((variant.color.clone(), vec![variant.id])),
            }
        }

        let mut task_keys = Vec::new();
        for (color, variant_ids) in &groups {
            match self
                .client
                .create_mockup_task(external_product_id, variant_ids, image_url)
                .await
            {
                Ok(task) => task_keys.push(task.task_key),
                Err(e) => {
                    tracing::warn!(
                        product_id = external_product_id,
                        color = color.as_deref().unwrap_or("(none)"),
                        error = %e,
                        "Mockup task creation failed for one color group"
                    );
                }
            }
        }

        // Fan-in: persistence starts only after every poll loop resolves
        let tasks = self.poller.wait_for_all(&task_keys).await;

        let mut stored = 0;
        for task in &tasks {
            for mockup in &task.mockups {
                let image = ProductImage {
                    external_product_id,
                    variant_ids: mockup.variant_ids.clone(),
                    url: mockup.mockup_url.clone(),
                    placement: mockup.placement.clone(),
                };
                match self.store.insert_product_image(image).await {
                    Ok(()) => stored += 1,
                    Err(e) => {
                        tracing::error!(
                            product_id = external_product_id,
                            error = %e,
                            "Failed to persist mockup image"
                        );
                    }
                }
            }
        }

        tracing::info!(
            product_id = external_product_id,
            tasks = task_keys.len(),
            completed = tasks.len(),
            stored,
            "Mockup generation finished"
        );
        Ok(stored)
    }

    /// Ingest one raw provider webhook event (signature already verified
    /// by the HTTP layer). Never fails; bad events are logged and dropped.
    pub async fn handle_webhook_event(&self, raw_event: Value) {
        self.dispatcher.handle(raw_event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::LocalOrder;
    use crate::store::MemoryOrderStore;
    use crate::testutil::MockTransport;
    use http::Method;
    use serde_json::json;

    fn config() -> FulfillmentConfig {
        FulfillmentConfig::default().with_token("test-token")
    }

    fn service_with(
        transport: MockTransport,
    ) -> (FulfillmentService, Arc<MemoryOrderStore>) {
        let store = Arc::new(MemoryOrderStore::new());
        let client = Arc::new(FulfillmentClient::with_transport(
            Arc::new(transport),
            &config(),
        ));
        let service =
            FulfillmentService::with_client(client, Arc::clone(&store) as Arc<dyn OrderStore>);
        (service, store)
    }

    fn recipient() -> Recipient {
        Recipient {
            name: "Ada Lovelace".into(),
            address1: "12 Analytical Way".into(),
            address2: None,
            city: "London".into(),
            state_code: None,
            country_code: "GB".into(),
            zip: "EC1A 1AA".into(),
            email: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn create_order_links_the_local_record() {
        let local = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        let local_id = local.id;

        let transport = MockTransport::always(
            200,
            json!({"code": 200, "result": {
                "id": 31337, "external_id": local_id.to_string(),
                "status": "draft", "shipments": []
            }}),
        );
        let (service, store) = service_with(transport);
        store.insert_order(local);

        let outcome = service
            .create_fulfillment_order(
                recipient(),
                vec![OrderItem {
                    variant_id: 4011,
                    quantity: 1,
                    name: None,
                    files: vec![],
                }],
                local_id.to_string(),
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.external_order_id, "31337");
        assert_eq!(outcome.provider_status, ProviderOrderStatus::Draft);
        let stored = store.get_order(local_id).await.unwrap().unwrap();
        assert_eq!(stored.external_order_id.as_deref(), Some("31337"));
    }

    #[tokio::test]
    async fn confirm_refuses_non_draft_orders_naming_the_status() {
        let transport = MockTransport::always(
            200,
            json!({"code": 200, "result": {
                "id": 31337, "status": "pending", "shipments": []
            }}),
        );
        let (service, _) = service_with(transport);

        let err = service.confirm_fulfillment_order("31337").await.unwrap_err();
        match err {
            FulfillmentError::Api { message, .. } => {
                assert!(message.contains("pending"), "error must name the status");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirm_advances_the_local_order_to_processing() {
        let mut local = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        local.external_order_id = Some("31337".into());
        let local_id = local.id;

        let transport = MockTransport::routes()
            .route(
                Method::GET,
                "orders/31337",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "draft", "shipments": []
                }}),
            )
            .route(
                Method::POST,
                "orders/31337/confirm",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "pending", "shipments": []
                }}),
            );
        let (service, store) = service_with(transport);
        store.insert_order(local);

        let outcome = service.confirm_fulfillment_order("31337").await.unwrap();
        assert!(outcome.local_updated);
        assert_eq!(outcome.provider_status, ProviderOrderStatus::Pending);

        let stored = store.get_order(local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LocalOrderStatus::Processing);
    }

    #[tokio::test]
    async fn confirm_never_regresses_a_terminal_local_order() {
        let mut local = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Cancelled);
        local.external_order_id = Some("31337".into());
        let local_id = local.id;

        let transport = MockTransport::routes()
            .route(
                Method::GET,
                "orders/31337",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "draft", "shipments": []
                }}),
            )
            .route(
                Method::POST,
                "orders/31337/confirm",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "pending", "shipments": []
                }}),
            );
        let (service, store) = service_with(transport);
        store.insert_order(local);

        let outcome = service.confirm_fulfillment_order("31337").await.unwrap();
        assert!(!outcome.local_updated);

        let stored = store.get_order(local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LocalOrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn confirm_leaves_a_shipped_order_alone() {
        let mut local = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Shipped);
        local.external_order_id = Some("31337".into());
        let local_id = local.id;

        let transport = MockTransport::routes()
            .route(
                Method::GET,
                "orders/31337",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "draft", "shipments": []
                }}),
            )
            .route(
                Method::POST,
                "orders/31337/confirm",
                200,
                json!({"code": 200, "result": {
                    "id": 31337, "status": "pending", "shipments": []
                }}),
            );
        let (service, store) = service_with(transport);
        store.insert_order(local);

        let outcome = service.confirm_fulfillment_order("31337").await.unwrap();
        assert!(!outcome.local_updated);

        // A shipped notification already landed; processing must not roll
        // the progression back
        let stored = store.get_order(local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LocalOrderStatus::Shipped);
    }

    #[tokio::test]
    async fn sync_reports_idempotent_second_pass() {
        let mut local = LocalOrder::new(Uuid::new_v4(), LocalOrderStatus::Paid);
        local.external_order_id = Some("8800".into());
        let local_id = local.id;

        let transport = MockTransport::always(
            200,
            json!({"code": 200, "result": {
                "id": 8800, "status": "fulfilled",
                "shipments": [{"tracking_number": "X"}]
            }}),
        );
        let (service, store) = service_with(transport);
        store.insert_order(local);

        let first = service.sync_order_status(local_id).await.unwrap();
        assert!(first.updated);
        assert_eq!(
            serde_json::to_value(&first.updates).unwrap(),
            json!({"status": "shipped", "tracking_number": "X"})
        );

        let second = service.sync_order_status(local_id).await.unwrap();
        assert!(!second.updated);
        assert!(second.updates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn generate_mockups_persists_per_color_results() {
        let transport = MockTransport::routes()
            .route(
                Method::GET,
                "products/71",
                200,
                json!({"code": 200, "result": {
                    "id": 71, "name": "Tee",
                    "variants": [
                        {"id": 1, "color": "black"},
                        {"id": 2, "color": "black"},
                        {"id": 3, "color": "white"}
                    ]
                }}),
            )
            .route(
                Method::POST,
                "mockup-generator/create-task/71",
                200,
                json!({"code": 200, "result": {
                    "task_key": "task-a", "status": "pending", "mockups": []
                }}),
            )
            .route(
                Method::GET,
                "mockup-generator/task",
                200,
                json!({"code": 200, "result": {
                    "task_key": "task-a", "status": "completed",
                    "mockups": [
                        {"variant_ids": [1, 2], "mockup_url": "https://img.example/black.png", "placement": "front"}
                    ]
                }}),
            );
        let (service, store) = service_with(transport);

        let stored = service
            .generate_mockups(71, "https://img.example/design.png")
            .await
            .unwrap();

        // Two color groups, each task completes with one mockup
        assert_eq!(stored, 2);
        let images = store.images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].url, "https://img.example/black.png");
    }

    #[tokio::test]
    async fn not_configured_short_circuits_the_whole_service() {
        let store = Arc::new(MemoryOrderStore::new());
        let service = FulfillmentService::new(
            &FulfillmentConfig::default(),
            Arc::clone(&store) as Arc<dyn OrderStore>,
        );

        let err = service
            .confirm_fulfillment_order("1")
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotConfigured));

        let err = service.generate_mockups(71, "https://x").await.unwrap_err();
        assert!(matches!(err, FulfillmentError::NotConfigured));
    }
}
