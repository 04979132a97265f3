// storefront/tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use flow::ContextData;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tienda::config::AppConfig;
use tienda::errors::AppError;
use tienda::models::{LineItem, Order, PaymentDetails, PaymentMethod, PaymentStatus, ShippingInfo};
use tienda::pipelines::contexts::{CheckoutCtxData, CheckoutRequest};
use tienda::services::mailer::{MailError, Mailer, OutgoingEmail};
use tienda::services::mercadopago::{GatewayError, PaymentGateway, Preference, PreferenceRequest};
use tienda::state::AppState;
use tienda::store::{InMemoryOrderStore, OrderStore};
use tracing::Level;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@tienda.test";
pub const CUSTOMER_EMAIL: &str = "ana@example.com";
pub const ADMIN_TOKEN: &str = "admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec-test";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Payment gateway double ---

/// Answers like MercadoPago and records every preference request.
#[derive(Default)]
pub struct FakeGateway {
  pub preference_requests: Mutex<Vec<PreferenceRequest>>,
  /// Oldest first, like the gateway's creation order.
  pub payments: Mutex<Vec<PaymentDetails>>,
  pub fail_preferences: AtomicBool,
  pub fail_payment_lookups: AtomicBool,
}

impl FakeGateway {
  pub fn preference_calls(&self) -> usize {
    self.preference_requests.lock().len()
  }

  pub fn set_fail_preferences(&self, fail: bool) {
    self.fail_preferences.store(fail, Ordering::SeqCst);
  }

  /// Adds a payment, or updates it in place when the id is already known.
  pub fn add_payment(&self, payment: PaymentDetails) {
    let mut payments = self.payments.lock();
    match payments.iter_mut().find(|p| p.payment_id == payment.payment_id) {
      Some(existing) => *existing = payment,
      None => payments.push(payment),
    }
  }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn create_preference(&self, request: &PreferenceRequest) -> Result<Preference, GatewayError> {
    self.preference_requests.lock().push(request.clone());
    if self.fail_preferences.load(Ordering::SeqCst) {
      return Err(GatewayError::Api {
        status: 503,
        body: "service unavailable".to_string(),
      });
    }
    let n = self.preference_calls();
    let id = format!("pref-{}-{}", request.order_id, n);
    Ok(Preference {
      id: Some(id.clone()),
      init_point: Some(format!("https://www.mercadopago.test/checkout?pref_id={}", id)),
      sandbox_init_point: Some(format!("https://sandbox.mercadopago.test/checkout?pref_id={}", id)),
    })
  }

  async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
    if self.fail_payment_lookups.load(Ordering::SeqCst) {
      return Err(GatewayError::Api {
        status: 500,
        body: "internal error".to_string(),
      });
    }
    let payments = self.payments.lock();
    payments.iter().find(|p| p.payment_id == payment_id).cloned().ok_or(GatewayError::Api {
      status: 404,
      body: "payment not found".to_string(),
    })
  }

  async fn find_payment_by_reference(&self, external_reference: &str) -> Result<Option<PaymentDetails>, GatewayError> {
    Ok(
      self
        .payments
        .lock()
        .iter()
        .rev()
        .find(|p| p.external_reference.as_deref() == Some(external_reference))
        .cloned(),
    )
  }
}

// --- Mail transport double ---

/// Records delivered messages; can be switched "down" to fail every send.
#[derive(Default)]
pub struct RecordingMailer {
  pub sent: Mutex<Vec<OutgoingEmail>>,
  pub attempts: Mutex<u32>,
  pub down: AtomicBool,
}

impl RecordingMailer {
  pub fn set_down(&self, down: bool) {
    self.down.store(down, Ordering::SeqCst);
  }

  pub fn sent_count(&self) -> usize {
    self.sent.lock().len()
  }

  pub fn count_to(&self, recipient: &str) -> usize {
    self.sent.lock().iter().filter(|m| m.to == recipient).count()
  }

  pub fn count_subject(&self, needle: &str) -> usize {
    self.sent.lock().iter().filter(|m| m.subject.contains(needle)).count()
  }
}

#[async_trait]
impl Mailer for RecordingMailer {
  async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
    *self.attempts.lock() += 1;
    if self.down.load(Ordering::SeqCst) {
      return Err(MailError::Transient("connection refused".to_string()));
    }
    let mut sent = self.sent.lock();
    sent.push(email.clone());
    Ok(format!("msg-{}", sent.len()))
  }
}

pub const PAYMENT_CONFIRMATION_SUBJECT: &str = "Pago confirmado";
pub const PAYMENT_ALERT_SUBJECT: &str = "preparar envío";

// --- Application under test ---

pub struct TestApp {
  pub state: AppState,
  pub store: InMemoryOrderStore,
  pub gateway: Arc<FakeGateway>,
  pub mailer: Arc<RecordingMailer>,
}

pub fn base_env() -> HashMap<String, String> {
  [
    ("APP_ENV", "test"),
    ("APP_BASE_URL", "https://tienda.test/"),
    ("MERCADOPAGO_ACCESS_TOKEN", "TEST-token"),
    ("ADMIN_EMAIL", ADMIN_EMAIL),
    ("WHATSAPP_NUMBER", "+54 9 11 5555-0000"),
    ("ADMIN_API_TOKEN", ADMIN_TOKEN),
    ("EMAIL_RETRY_BACKOFF_MS", "1"),
  ]
  .into_iter()
  .map(|(k, v)| (k.to_string(), v.to_string()))
  .collect()
}

impl TestApp {
  pub fn new() -> Self {
    Self::with_env(&[])
  }

  /// `overrides` replace or extend the base environment.
  pub fn with_env(overrides: &[(&str, &str)]) -> Self {
    Self::build(overrides, |store| Arc::new(store) as Arc<dyn OrderStore>)
  }

  /// Runs the pipelines against `wrap(store)`; `self.store` still reads the
  /// underlying in-memory data.
  pub fn with_store<F>(wrap: F) -> Self
  where
    F: FnOnce(InMemoryOrderStore) -> Arc<dyn OrderStore>,
  {
    Self::build(&[], wrap)
  }

  fn build<F>(overrides: &[(&str, &str)], wrap: F) -> Self
  where
    F: FnOnce(InMemoryOrderStore) -> Arc<dyn OrderStore>,
  {
    setup_tracing();
    let mut env = base_env();
    for (k, v) in overrides {
      env.insert(k.to_string(), v.to_string());
    }
    let config = AppConfig::from_lookup(|name| env.get(name).cloned()).expect("test config");

    let store = InMemoryOrderStore::new();
    let gateway = Arc::new(FakeGateway::default());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(Arc::new(config), wrap(store.clone()), gateway.clone(), mailer.clone());
    Self {
      state,
      store,
      gateway,
      mailer,
    }
  }

  pub async fn order(&self, id: Uuid) -> Order {
    self.store.get(id).await.expect("store read").expect("order exists")
  }

  pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutCtxData, AppError> {
    let ctx = ContextData::new(CheckoutCtxData::new(self.state.clone(), request));
    self.state.flows.run(ctx.clone()).await?;
    Ok(ctx.snapshot())
  }
}

// --- Fixtures ---

pub fn shipping() -> ShippingInfo {
  ShippingInfo {
    name: "Ana Gómez".to_string(),
    email: CUSTOMER_EMAIL.to_string(),
    phone: "+54 11 5555-1234".to_string(),
    address: "Av. Corrientes 1234".to_string(),
    city: "Buenos Aires".to_string(),
    postal_code: "C1043".to_string(),
  }
}

/// 10.00 x 2 + 5.00 x 1 = 25.00
pub fn k1_items() -> Vec<LineItem> {
  vec![
    LineItem {
      product_id: "yerba-1kg".to_string(),
      title: "Yerba mate 1kg".to_string(),
      quantity: 2,
      price: Decimal::new(1000, 2),
      image: None,
    },
    LineItem {
      product_id: "bombilla".to_string(),
      title: "Bombilla".to_string(),
      quantity: 1,
      price: Decimal::new(500, 2),
      image: Some("https://cdn.tienda.test/bombilla.jpg".to_string()),
    },
  ]
}

pub fn checkout_request(key: &str, method: PaymentMethod) -> CheckoutRequest {
  CheckoutRequest {
    items: k1_items(),
    declared_total: Some(Decimal::new(2500, 2)),
    payment_method: method,
    shipping_info: shipping(),
    idempotency_key: key.to_string(),
    user_id: None,
  }
}

pub fn payment(payment_id: &str, order_id: Uuid, status: PaymentStatus) -> PaymentDetails {
  PaymentDetails {
    payment_id: payment_id.to_string(),
    status,
    status_detail: Some(format!("{:?}", status).to_lowercase()),
    approved_at: None,
    payment_method_id: Some("visa".to_string()),
    external_reference: Some(order_id.to_string()),
    transaction_amount: Some(Decimal::new(2500, 2)),
  }
}
