//! Order reconciliation: merging the provider's authoritative order state
//! into the local mirror under monotonicity and idempotence guarantees
//!
//! Status mapping is closed and conservative — only `fulfilled` and
//! `canceled` move the local status; every other provider status (including
//! ones this integration has never seen) leaves it untouched. Tracking sync
//! is independent of status sync and runs even for terminal orders.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::{ExternalOrder, FulfillmentClient, ProviderOrderStatus};
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::order::{LocalOrder, LocalOrderStatus, OrderUpdate};
use crate::store::OrderStore;

/// Per-order advisory locks. A webhook and a manual sync racing on the same
/// order serialize their read-modify-write here; different orders proceed
/// in parallel.
///
/// The registry keeps one entry per order seen and is never evicted: an
/// entry is a few dozen bytes and the population is bounded by the orders
/// touched over the process lifetime.
#[derive(Default)]
pub struct OrderLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for one order
    pub fn for_order(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Provider status → local status. Sparse by design: unmapped provider
/// states must never be guessed at.
pub fn map_provider_status(status: ProviderOrderStatus) -> Option<LocalOrderStatus> {
    match status {
        ProviderOrderStatus::Fulfilled => Some(LocalOrderStatus::Shipped),
        ProviderOrderStatus::Canceled => Some(LocalOrderStatus::Cancelled),
        ProviderOrderStatus::Draft
        | ProviderOrderStatus::Pending
        | ProviderOrderStatus::Onhold
        | ProviderOrderStatus::Inprocess
        | ProviderOrderStatus::Partial
        | ProviderOrderStatus::Failed
        | ProviderOrderStatus::Unknown => None,
    }
}

/// Compute the minimal diff that brings `local` in line with `external`.
///
/// Rules, in order:
/// 1. Terminal local statuses skip status mutation entirely.
/// 2. Otherwise the sparse mapping table applies.
/// 3. Tracking sync runs regardless: only the most recent shipment counts,
///    and only when it carries a non-empty tracking number.
pub fn reconcile(local: &LocalOrder, external: &ExternalOrder) -> OrderUpdate {
    let mut update = OrderUpdate::default();

    if !local.status.is_terminal() {
        if let Some(mapped) = map_provider_status(external.status) {
            if mapped != local.status {
                update.status = Some(mapped);
            }
        }
    }

    if let Some(shipment) = external.most_recent_shipment() {
        if let Some(tracking_number) = shipment.tracking() {
            if local.tracking_number.as_deref() != Some(tracking_number) {
                update.tracking_number = Some(tracking_number.to_string());
            }
            if shipment.tracking_url.is_some() && local.tracking_url != shipment.tracking_url {
                update.tracking_url = shipment.tracking_url.clone();
            }
            if shipment.carrier.is_some() && local.carrier != shipment.carrier {
                update.carrier = shipment.carrier.clone();
            }
        }
    }

    update
}

/// Result of one reconciliation pass
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Whether any field was persisted
    pub updated: bool,
    /// The diff that was (or would have been) applied
    pub updates: OrderUpdate,
    /// Provider status observed during the pass
    pub provider_status: ProviderOrderStatus,
}

/// Pull-based reconciliation engine
pub struct ReconciliationEngine {
    client: Arc<FulfillmentClient>,
    store: Arc<dyn OrderStore>,
    locks: Arc<OrderLocks>,
}

impl ReconciliationEngine {
    pub fn new(
        client: Arc<FulfillmentClient>,
        store: Arc<dyn OrderStore>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            client,
            store,
            locks,
        }
    }

    /// Fetch the provider's view of one order and fold it into the local
    /// record. Repeated calls with no provider-side change are no-ops.
    pub async fn sync_order_status(&self, local_order_id: Uuid) -> FulfillmentResult<SyncOutcome> {
        let lock = self.locks.for_order(local_order_id);
        let _guard = lock.lock().await;

        let order = self
            .store
            .get_order(local_order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(format!("order {local_order_id}")))?;

        let external_order_id = order.external_order_id.clone().ok_or_else(|| {
            FulfillmentError::not_found(format!("fulfillment order for {local_order_id}"))
        })?;

        let external = self.client.get_order(&external_order_id).await?;
        let update = reconcile(&order, &external);

        if update.is_empty() {
            tracing::debug!(order_id = %local_order_id, provider_status = %external.status, "Order already in sync");
            return Ok(SyncOutcome {
                updated: false,
                updates: update,
                provider_status: external.status,
            });
        }

        self.store.update_order(local_order_id, &update).await?;
        tracing::info!(
            order_id = %local_order_id,
            provider_status = %external.status,
            changed = ?update.changed_fields(),
            "Order reconciled"
        );

        Ok(SyncOutcome {
            updated: true,
            updates: update,
            provider_status: external.status,
        })
    }
}
