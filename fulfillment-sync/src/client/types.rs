//! Typed wire model for the provider REST API
//!
//! The provider wraps every response in an envelope carrying its own `code`
//! field; a 200 HTTP status with a non-200 envelope code is still an error.
//! Unknown enum values deserialize into explicit `Unknown`/`Other` variants
//! so new provider states never break decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Response envelope
// ============================================================================

/// Standard provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEnvelope {
    pub code: i64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProviderErrorBody>,
}

/// Error payload embedded in an envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Orders
// ============================================================================

/// Provider-side order status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOrderStatus {
    Draft,
    Pending,
    Onhold,
    Inprocess,
    Partial,
    Fulfilled,
    Canceled,
    Failed,
    /// Any status this integration does not know about
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ProviderOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Onhold => "onhold",
            Self::Inprocess => "inprocess",
            Self::Partial => "partial",
            Self::Fulfilled => "fulfilled",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// The provider's current view of an order (read model, not persisted)
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalOrder {
    pub id: i64,
    /// Idempotency key the store supplied at creation time
    #[serde(default)]
    pub external_id: Option<String>,
    pub status: ProviderOrderStatus,
    #[serde(default)]
    pub shipments: Vec<Shipment>,
}

impl ExternalOrder {
    /// Most recent shipment, by provider timestamp when present,
    /// falling back to list position
    pub fn most_recent_shipment(&self) -> Option<&Shipment> {
        self.shipments
            .iter()
            .enumerate()
            .max_by_key(|(idx, s)| (s.created, *idx))
            .map(|(_, s)| s)
    }
}

/// A shipment attached to a provider order. The shipment record may exist
/// before a tracking number is assigned; only a non-empty tracking number
/// counts as evidence of dispatch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Shipment {
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
}

impl Shipment {
    /// Tracking number when present and non-empty
    pub fn tracking(&self) -> Option<&str> {
        self.tracking_number.as_deref().filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Order creation
// ============================================================================

/// Shipping recipient for a new fulfillment order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub country_code: String,
    pub zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One line item in a new fulfillment order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    /// Provider catalog variant to produce
    pub variant_id: i64,
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Print file URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<OrderFile>,
}

/// A print file reference on an order item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFile {
    pub url: String,
}

/// Request body for order creation
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Deterministic idempotency key derived from the local order id
    pub external_id: String,
    pub recipient: Recipient,
    pub items: Vec<OrderItem>,
}

// ============================================================================
// Catalog
// ============================================================================

/// A catalog product with its sellable variants
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogProduct {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub variants: Vec<CatalogVariant>,
}

/// A single sellable variant (size/color combination)
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogVariant {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

// ============================================================================
// Mockup tasks
// ============================================================================

/// Status of a provider-side mockup generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockupTaskStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A mockup generation job and (once completed) its rendered images
#[derive(Debug, Clone, Deserialize)]
pub struct MockupTask {
    pub task_key: String,
    pub status: MockupTaskStatus,
    #[serde(default)]
    pub mockups: Vec<Mockup>,
    /// Provider-supplied failure reason
    #[serde(default)]
    pub error: Option<String>,
}

/// A rendered mockup image keyed to catalog variants
#[derive(Debug, Clone, Deserialize)]
pub struct Mockup {
    #[serde(default)]
    pub variant_ids: Vec<i64>,
    pub mockup_url: String,
    #[serde(default)]
    pub placement: Option<String>,
}
