// storefront/src/web/dto.rs

//! Request and response bodies of the HTTP API. All camelCase.

use crate::models::{LineItem, Order, OrderStatus, PaymentMethod, PreferenceLinks, ShippingInfo};
use crate::services::notifications::DeliveryReport;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
  pub items: Vec<LineItem>,
  #[serde(default)]
  pub total_amount: Option<Decimal>,
  pub payment_method: PaymentMethod,
  pub shipping_info: ShippingInfo,
  /// May also come in the `Idempotency-Key` header.
  #[serde(default)]
  pub idempotency_key: Option<String>,
  #[serde(default)]
  pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
  pub order_id: Uuid,
  pub status: OrderStatus,
  pub total_amount: Decimal,
  pub replayed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payment_info: Option<PreferenceLinks>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub whatsapp_link: Option<String>,
  pub notifications: Vec<DeliveryReport>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
  #[serde(default)]
  pub refresh: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
  pub order: Order,
  /// The payment was re-read from the gateway for this response.
  pub refreshed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub refresh_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecreatePaymentResponse {
  pub order_id: Uuid,
  pub status: OrderStatus,
  pub payment_attempts: u32,
  pub payment_info: PreferenceLinks,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub notifications: Vec<DeliveryReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendConfirmationResponse {
  pub order_id: Uuid,
  #[serde(flatten)]
  pub delivery: DeliveryReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppLinkResponse {
  pub order_id: Uuid,
  pub whatsapp_link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
  pub received: bool,
  pub transitioned: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order_id: Option<Uuid>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ignored: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminStatusRequest {
  pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatusResponse {
  pub order_id: Uuid,
  pub previous_status: OrderStatus,
  pub status: OrderStatus,
  pub notifications: Vec<DeliveryReport>,
}
