// storefront/src/models/order.rs

use crate::models::payment::{PaymentDetails, PreferenceLinks};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pendiente,
  Pagado,
  Enviado,
  Entregado,
  Cancelado,
  WhatsappPendiente,
}

impl OrderStatus {
  /// Statuses an approved payment may move to `Pagado`.
  pub const PAYABLE: [OrderStatus; 3] = [OrderStatus::Pendiente, OrderStatus::Cancelado, OrderStatus::WhatsappPendiente];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pendiente => "pendiente",
      OrderStatus::Pagado => "pagado",
      OrderStatus::Enviado => "enviado",
      OrderStatus::Entregado => "entregado",
      OrderStatus::Cancelado => "cancelado",
      OrderStatus::WhatsappPendiente => "whatsapp_pendiente",
    }
  }

  /// `Pagado` and everything downstream of it.
  pub fn is_paid(self) -> bool {
    matches!(self, OrderStatus::Pagado | OrderStatus::Enviado | OrderStatus::Entregado)
  }

  /// Order lifecycle:
  ///
  /// ```text
  /// pendiente          -> pagado, cancelado
  /// whatsapp_pendiente -> pagado, cancelado
  /// pagado             -> enviado, cancelado
  /// enviado            -> entregado
  /// cancelado          -> pendiente (only when re-entry is allowed)
  /// entregado          -> (terminal)
  /// ```
  pub fn can_transition_to(self, next: OrderStatus, allow_cancelled_reentry: bool) -> bool {
    use OrderStatus::*;
    match (self, next) {
      (Pendiente, Pagado) | (Pendiente, Cancelado) => true,
      (WhatsappPendiente, Pagado) | (WhatsappPendiente, Cancelado) => true,
      (Pagado, Enviado) | (Pagado, Cancelado) => true,
      (Enviado, Entregado) => true,
      (Cancelado, Pendiente) => allow_cancelled_reentry,
      _ => false,
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pendiente" => Ok(OrderStatus::Pendiente),
      "pagado" => Ok(OrderStatus::Pagado),
      "enviado" => Ok(OrderStatus::Enviado),
      "entregado" => Ok(OrderStatus::Entregado),
      "cancelado" => Ok(OrderStatus::Cancelado),
      "whatsapp_pendiente" => Ok(OrderStatus::WhatsappPendiente),
      other => Err(format!("unknown order status '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
  #[serde(rename = "mercadopago")]
  MercadoPago,
  #[serde(rename = "whatsapp")]
  WhatsApp,
}

impl PaymentMethod {
  /// Status a freshly placed order starts in. WhatsApp orders are settled by
  /// hand and never see the gateway.
  pub fn initial_status(self) -> OrderStatus {
    match self {
      PaymentMethod::MercadoPago => OrderStatus::Pendiente,
      PaymentMethod::WhatsApp => OrderStatus::WhatsappPendiente,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      PaymentMethod::MercadoPago => "mercadopago",
      PaymentMethod::WhatsApp => "whatsapp",
    }
  }
}

impl fmt::Display for PaymentMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentMethod {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "mercadopago" => Ok(PaymentMethod::MercadoPago),
      "whatsapp" => Ok(PaymentMethod::WhatsApp),
      other => Err(format!("unknown payment method '{}'", other)),
    }
  }
}

/// One cart line, with the product's title and image captured at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
  pub product_id: String,
  pub title: String,
  pub quantity: u32,
  pub price: Decimal,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
}

impl LineItem {
  pub fn subtotal(&self) -> Decimal {
    self.price * Decimal::from(self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
  #[validate(length(min = 1, max = 200))]
  pub name: String,
  #[validate(email)]
  pub email: String,
  #[validate(length(min = 6, max = 40))]
  pub phone: String,
  #[validate(length(min = 1, max = 300))]
  pub address: String,
  #[validate(length(min = 1, max = 120))]
  pub city: String,
  #[validate(length(min = 1, max = 20))]
  pub postal_code: String,
}

impl ShippingInfo {
  /// `(field, value)` pairs, used for blank-field checks.
  pub fn fields(&self) -> [(&'static str, &str); 6] {
    [
      ("name", self.name.as_str()),
      ("email", self.email.as_str()),
      ("phone", self.phone.as_str()),
      ("address", self.address.as_str()),
      ("city", self.city.as_str()),
      ("postalCode", self.postal_code.as_str()),
    ]
  }

  pub fn full_address(&self) -> String {
    format!("{}, {} ({})", self.address, self.city, self.postal_code)
  }
}

pub fn compute_total(items: &[LineItem]) -> Decimal {
  items.iter().map(LineItem::subtotal).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub items: Vec<LineItem>,
  pub total_amount: Decimal,
  pub shipping_info: ShippingInfo,
  pub payment_method: PaymentMethod,
  pub status: OrderStatus,
  pub idempotency_key: String,
  pub user_id: Option<String>,
  pub preference_id: Option<String>,
  pub init_point: Option<String>,
  pub sandbox_init_point: Option<String>,
  pub redirect_url: Option<String>,
  /// Preferences requested so far; feeds the gateway idempotency header.
  pub payment_attempts: u32,
  pub payment_details: Option<PaymentDetails>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// A new order in its method's initial status, with the total derived
  /// from `items`.
  pub fn place(
    items: Vec<LineItem>,
    shipping_info: ShippingInfo,
    payment_method: PaymentMethod,
    idempotency_key: String,
    user_id: Option<String>,
  ) -> Self {
    let now = Utc::now();
    let total_amount = compute_total(&items);
    Self {
      id: Uuid::new_v4(),
      items,
      total_amount,
      shipping_info,
      payment_method,
      status: payment_method.initial_status(),
      idempotency_key,
      user_id,
      preference_id: None,
      init_point: None,
      sandbox_init_point: None,
      redirect_url: None,
      payment_attempts: 0,
      payment_details: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn apply_preference(&mut self, links: &PreferenceLinks) {
    self.preference_id = Some(links.preference_id.clone());
    self.init_point = links.init_point.clone();
    self.sandbox_init_point = links.sandbox_init_point.clone();
    self.redirect_url = Some(links.redirect_url.clone());
    self.payment_attempts += 1;
    self.status = OrderStatus::Pendiente;
    self.updated_at = Utc::now();
  }

  pub fn payment_links(&self) -> Option<PreferenceLinks> {
    match (&self.preference_id, &self.redirect_url) {
      (Some(preference_id), Some(redirect_url)) => Some(PreferenceLinks {
        preference_id: preference_id.clone(),
        init_point: self.init_point.clone(),
        sandbox_init_point: self.sandbox_init_point.clone(),
        redirect_url: redirect_url.clone(),
      }),
      _ => None,
    }
  }
}
