//! Local order record and the minimal-diff update applied to it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-side order status
///
/// Canonical progression is `pending → paid → processing → shipped →
/// delivered`; cancellation, refund and fulfillment failure are side
/// branches. Terminal statuses are never overwritten by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalOrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    FulfillmentFailed,
    FulfillmentCanceled,
}

impl LocalOrderStatus {
    /// Whether no further automated transition is permitted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::FulfillmentFailed => "fulfillment_failed",
            Self::FulfillmentCanceled => "fulfillment_canceled",
        }
    }
}

impl std::fmt::Display for LocalOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The store's own order record, as seen by this subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOrder {
    pub id: Uuid,
    pub status: LocalOrderStatus,
    /// Provider order id; set once, never cleared
    pub external_order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub carrier: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LocalOrder {
    /// New order as the checkout flow creates it
    pub fn new(id: Uuid, status: LocalOrderStatus) -> Self {
        Self {
            id,
            status,
            external_order_id: None,
            tracking_number: None,
            tracking_url: None,
            carrier: None,
            updated_at: Utc::now(),
        }
    }
}

/// Minimal diff against a [`LocalOrder`]; only fields that actually change
/// are present, so persisting an empty update is a no-op
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LocalOrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
}

impl OrderUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.external_order_id.is_none()
            && self.tracking_number.is_none()
            && self.tracking_url.is_none()
            && self.carrier.is_none()
    }

    /// Names of the fields this update touches, for structured logging
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.external_order_id.is_some() {
            fields.push("external_order_id");
        }
        if self.tracking_number.is_some() {
            fields.push("tracking_number");
        }
        if self.tracking_url.is_some() {
            fields.push("tracking_url");
        }
        if self.carrier.is_some() {
            fields.push("carrier");
        }
        fields
    }

    /// Apply the diff to an order record
    pub fn apply(&self, order: &mut LocalOrder) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(external_order_id) = &self.external_order_id {
            order.external_order_id = Some(external_order_id.clone());
        }
        if let Some(tracking_number) = &self.tracking_number {
            order.tracking_number = Some(tracking_number.clone());
        }
        if let Some(tracking_url) = &self.tracking_url {
            order.tracking_url = Some(tracking_url.clone());
        }
        if let Some(carrier) = &self.carrier {
            order.carrier = Some(carrier.clone());
        }
        if !self.is_empty() {
            order.updated_at = Utc::now();
        }
    }
}
