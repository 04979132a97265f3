// storefront/src/pipelines/contexts.rs

//! Data carried through each pipeline. Handlers receive these wrapped in
//! `flow::ContextData`.

use crate::models::{LineItem, Order, OrderStatus, PaymentDetails, PaymentMethod, PreferenceLinks, ShippingInfo};
use crate::services::notifications::DeliveryReport;
use crate::state::AppState;
use flow::ContextData;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Checkout input as received from the storefront.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
  pub items: Vec<LineItem>,
  /// Total the client believes it is paying; must match the computed one.
  pub declared_total: Option<Decimal>,
  pub payment_method: PaymentMethod,
  pub shipping_info: ShippingInfo,
  pub idempotency_key: String,
  pub user_id: Option<String>,
}

// --- Payment arm sub-contexts ---

/// Requests a gateway preference for `order` and stores it.
#[derive(Clone)]
pub struct PreferenceCtxData {
  pub app_state: AppState,
  pub order: Order,
  /// Statuses the order may be in when the new preference is stored.
  pub expected_statuses: Vec<OrderStatus>,
  pub links: Option<PreferenceLinks>,
  /// Gateway failure, captured instead of failing the run.
  pub gateway_error: Option<String>,
  pub updated_order: Option<Order>,
}

impl PreferenceCtxData {
  pub fn new(app_state: AppState, order: Order, expected_statuses: Vec<OrderStatus>) -> Self {
    Self {
      app_state,
      order,
      expected_statuses,
      links: None,
      gateway_error: None,
      updated_order: None,
    }
  }
}

#[derive(Clone)]
pub struct WhatsAppCtxData {
  pub app_state: AppState,
  pub order: Order,
  /// `wa.me` deep link the customer follows to settle the order.
  pub link: Option<String>,
}

/// The payment arm chosen for a checkout, holding that arm's own context.
#[derive(Clone)]
pub enum PaymentRoute {
  None,
  MercadoPago(ContextData<PreferenceCtxData>),
  WhatsApp(ContextData<WhatsAppCtxData>),
}

// --- Orchestrating contexts ---

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub request: CheckoutRequest,
  pub order: Option<Order>,
  /// The idempotency key already belonged to an order.
  pub replayed: bool,
  pub payment_route: PaymentRoute,
  pub payment_links: Option<PreferenceLinks>,
  pub gateway_error: Option<String>,
  pub whatsapp_link: Option<String>,
  pub notifications: Vec<DeliveryReport>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, request: CheckoutRequest) -> Self {
    Self {
      app_state,
      request,
      order: None,
      replayed: false,
      payment_route: PaymentRoute::None,
      payment_links: None,
      gateway_error: None,
      whatsapp_link: None,
      notifications: Vec::new(),
    }
  }
}

impl std::fmt::Debug for CheckoutCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CheckoutCtxData")
      .field("request", &self.request)
      .field("order", &self.order)
      .field("replayed", &self.replayed)
      .field("payment_links", &self.payment_links)
      .field("gateway_error", &self.gateway_error)
      .field("whatsapp_link", &self.whatsapp_link)
      .field("notifications", &self.notifications)
      .finish_non_exhaustive()
  }
}

/// Where a payment notification came from.
#[derive(Debug, Clone)]
pub enum NotificationSource {
  /// Pushed by the gateway to the webhook endpoint.
  Webhook {
    body: serde_json::Value,
    query: HashMap<String, String>,
    signature: Option<String>,
    request_id: Option<String>,
  },
  /// Status refresh requested for one order.
  Poll { order_id: Uuid },
}

#[derive(Clone)]
pub struct PaymentNotificationCtxData {
  pub app_state: AppState,
  pub source: NotificationSource,
  pub topic: Option<String>,
  pub payment_id: Option<String>,
  pub payment: Option<PaymentDetails>,
  pub order: Option<Order>,
  /// This run moved the order to `pagado`.
  pub transitioned: bool,
  /// Why the notification was acknowledged without any effect.
  pub ignored_reason: Option<String>,
  pub notifications: Vec<DeliveryReport>,
}

impl std::fmt::Debug for PaymentNotificationCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PaymentNotificationCtxData")
      .field("source", &self.source)
      .field("topic", &self.topic)
      .field("payment_id", &self.payment_id)
      .field("payment", &self.payment)
      .field("order", &self.order)
      .field("transitioned", &self.transitioned)
      .field("ignored_reason", &self.ignored_reason)
      .field("notifications", &self.notifications)
      .finish_non_exhaustive()
  }
}

impl PaymentNotificationCtxData {
  pub fn new(app_state: AppState, source: NotificationSource) -> Self {
    Self {
      app_state,
      source,
      topic: None,
      payment_id: None,
      payment: None,
      order: None,
      transitioned: false,
      ignored_reason: None,
      notifications: Vec::new(),
    }
  }

  pub fn is_poll(&self) -> bool {
    matches!(self.source, NotificationSource::Poll { .. })
  }
}

#[derive(Clone)]
pub struct RecreatePaymentCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub preference: Option<ContextData<PreferenceCtxData>>,
  pub links: Option<PreferenceLinks>,
  pub updated_order: Option<Order>,
  pub notifications: Vec<DeliveryReport>,
}

impl std::fmt::Debug for RecreatePaymentCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RecreatePaymentCtxData")
      .field("order_id", &self.order_id)
      .field("order", &self.order)
      .field("links", &self.links)
      .field("updated_order", &self.updated_order)
      .field("notifications", &self.notifications)
      .finish_non_exhaustive()
  }
}

impl RecreatePaymentCtxData {
  pub fn new(app_state: AppState, order_id: Uuid) -> Self {
    Self {
      app_state,
      order_id,
      order: None,
      preference: None,
      links: None,
      updated_order: None,
      notifications: Vec::new(),
    }
  }
}

#[derive(Clone)]
pub struct ResendConfirmationCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub order: Option<Order>,
  pub report: Option<DeliveryReport>,
}

impl std::fmt::Debug for ResendConfirmationCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResendConfirmationCtxData")
      .field("order_id", &self.order_id)
      .field("order", &self.order)
      .field("report", &self.report)
      .finish_non_exhaustive()
  }
}

impl ResendConfirmationCtxData {
  pub fn new(app_state: AppState, order_id: Uuid) -> Self {
    Self {
      app_state,
      order_id,
      order: None,
      report: None,
    }
  }
}

#[derive(Clone)]
pub struct AdminStatusCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub requested: OrderStatus,
  pub order: Option<Order>,
  pub updated_order: Option<Order>,
  pub transitioned_to_paid: bool,
  pub notifications: Vec<DeliveryReport>,
}

impl AdminStatusCtxData {
  pub fn new(app_state: AppState, order_id: Uuid, requested: OrderStatus) -> Self {
    Self {
      app_state,
      order_id,
      requested,
      order: None,
      updated_order: None,
      transitioned_to_paid: false,
      notifications: Vec::new(),
    }
  }
}

impl std::fmt::Debug for AdminStatusCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AdminStatusCtxData")
      .field("order_id", &self.order_id)
      .field("requested", &self.requested)
      .field("order", &self.order)
      .field("updated_order", &self.updated_order)
      .field("transitioned_to_paid", &self.transitioned_to_paid)
      .field("notifications", &self.notifications)
      .finish_non_exhaustive()
  }
}
