// storefront/src/models/payment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gateway-side payment status. Anything unrecognised maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Approved,
  Pending,
  InProcess,
  Authorized,
  Rejected,
  Cancelled,
  Refunded,
  ChargedBack,
  #[serde(other)]
  Other,
}

impl PaymentStatus {
  pub fn is_approved(self) -> bool {
    matches!(self, PaymentStatus::Approved)
  }
}

/// Snapshot of a gateway payment, cached on the order. The gateway stays the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
  pub payment_id: String,
  pub status: PaymentStatus,
  pub status_detail: Option<String>,
  pub approved_at: Option<DateTime<Utc>>,
  pub payment_method_id: Option<String>,
  /// Order id the payment was created for.
  pub external_reference: Option<String>,
  pub transaction_amount: Option<Decimal>,
}

/// Where the customer goes to pay, as stored on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceLinks {
  pub preference_id: String,
  pub init_point: Option<String>,
  pub sandbox_init_point: Option<String>,
  pub redirect_url: String,
}
