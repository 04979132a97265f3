// storefront/src/services/mercadopago.rs

//! MercadoPago Checkout Pro client: payment preferences and payment lookups.

use crate::config::{AppEnv, MercadoPagoConfig};
use crate::models::{LineItem, PaymentDetails, PaymentStatus, PreferenceLinks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("gateway request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("gateway responded {status}: {body}")]
  Api { status: u16, body: String },

  #[error("unusable gateway response: {0}")]
  InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct BackUrls {
  pub success: String,
  pub failure: String,
  pub pending: String,
}

/// Everything needed to open a checkout for one order.
#[derive(Debug, Clone)]
pub struct PreferenceRequest {
  pub order_id: Uuid,
  pub items: Vec<LineItem>,
  pub total_amount: Decimal,
  pub payer_name: String,
  pub payer_email: String,
  pub currency_id: String,
  pub back_urls: BackUrls,
  pub notification_url: String,
  /// Sent as `X-Idempotency-Key`; one per order and attempt.
  pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Preference {
  pub id: Option<String>,
  pub init_point: Option<String>,
  pub sandbox_init_point: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_preference(&self, request: &PreferenceRequest) -> Result<Preference, GatewayError>;

  async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError>;

  /// Most recent payment created for `external_reference`, if any.
  async fn find_payment_by_reference(&self, external_reference: &str) -> Result<Option<PaymentDetails>, GatewayError>;
}

/// Development prefers the sandbox checkout and falls back to production;
/// every other environment does the opposite.
pub fn select_redirect_url(env: AppEnv, init_point: Option<&str>, sandbox_init_point: Option<&str>) -> Option<String> {
  let non_empty = |url: Option<&str>| url.filter(|u| !u.trim().is_empty()).map(str::to_string);
  match env {
    AppEnv::Development => non_empty(sandbox_init_point).or_else(|| non_empty(init_point)),
    AppEnv::Test | AppEnv::Production => non_empty(init_point).or_else(|| non_empty(sandbox_init_point)),
  }
}

/// Validates a gateway preference and picks the redirect URL for `env`.
/// A preference without an id, or without any checkout URL, is unusable.
pub fn resolve_preference(preference: Preference, env: AppEnv) -> Result<PreferenceLinks, GatewayError> {
  let preference_id = preference
    .id
    .filter(|id| !id.is_empty())
    .ok_or_else(|| GatewayError::InvalidResponse("preference has no id".to_string()))?;
  let redirect_url = select_redirect_url(env, preference.init_point.as_deref(), preference.sandbox_init_point.as_deref())
    .ok_or_else(|| GatewayError::InvalidResponse(format!("preference {} has no checkout URL", preference_id)))?;
  Ok(PreferenceLinks {
    preference_id,
    init_point: preference.init_point,
    sandbox_init_point: preference.sandbox_init_point,
    redirect_url,
  })
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
  id: &'a str,
  title: &'a str,
  quantity: u32,
  #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
  unit_price: Decimal,
  currency_id: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  picture_url: Option<&'a str>,
}

/// Wire shape of `GET /v1/payments/{id}`. Ids arrive as numbers.
#[derive(Debug, Deserialize)]
struct PaymentResponse {
  id: serde_json::Value,
  status: PaymentStatus,
  status_detail: Option<String>,
  date_approved: Option<DateTime<Utc>>,
  payment_method_id: Option<String>,
  external_reference: Option<String>,
  transaction_amount: Option<Decimal>,
}

impl From<PaymentResponse> for PaymentDetails {
  fn from(p: PaymentResponse) -> Self {
    let payment_id = match p.id {
      serde_json::Value::String(s) => s,
      other => other.to_string(),
    };
    PaymentDetails {
      payment_id,
      status: p.status,
      status_detail: p.status_detail,
      approved_at: p.date_approved,
      payment_method_id: p.payment_method_id,
      external_reference: p.external_reference,
      transaction_amount: p.transaction_amount,
    }
  }
}

#[derive(Debug, Deserialize)]
struct PaymentSearchResponse {
  #[serde(default)]
  results: Vec<PaymentResponse>,
}

pub struct MercadoPagoClient {
  http: Client,
  api_base: String,
  access_token: String,
}

impl MercadoPagoClient {
  pub fn new(config: &MercadoPagoConfig) -> Result<Self, GatewayError> {
    let http = Client::builder().timeout(config.timeout).build()?;
    Ok(Self {
      http,
      api_base: config.api_base.clone(),
      access_token: config.access_token.clone(),
    })
  }

  async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
      warn!(status = status.as_u16(), "MercadoPago returned an error status.");
      return Err(GatewayError::Api {
        status: status.as_u16(),
        body,
      });
    }
    response
      .json::<T>()
      .await
      .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
  }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
  #[instrument(name = "mercadopago::create_preference", skip_all, fields(order_id = %request.order_id), err)]
  async fn create_preference(&self, request: &PreferenceRequest) -> Result<Preference, GatewayError> {
    let items: Vec<PreferenceItem<'_>> = request
      .items
      .iter()
      .map(|item| PreferenceItem {
        id: &item.product_id,
        title: &item.title,
        quantity: item.quantity,
        unit_price: item.price,
        currency_id: &request.currency_id,
        picture_url: item.image.as_deref(),
      })
      .collect();
    let body = json!({
      "items": items,
      "payer": { "name": request.payer_name, "email": request.payer_email },
      "back_urls": {
        "success": request.back_urls.success,
        "failure": request.back_urls.failure,
        "pending": request.back_urls.pending,
      },
      "auto_return": "approved",
      "external_reference": request.order_id.to_string(),
      "notification_url": request.notification_url,
    });

    let response = self
      .http
      .post(format!("{}/checkout/preferences", self.api_base))
      .bearer_auth(&self.access_token)
      .header("X-Idempotency-Key", &request.idempotency_key)
      .json(&body)
      .send()
      .await?;
    let preference: Preference = Self::read_json(response).await?;
    info!(preference_id = ?preference.id, "MercadoPago preference created.");
    Ok(preference)
  }

  #[instrument(name = "mercadopago::get_payment", skip(self), err)]
  async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails, GatewayError> {
    let response = self
      .http
      .get(format!("{}/v1/payments/{}", self.api_base, urlencoding::encode(payment_id)))
      .bearer_auth(&self.access_token)
      .send()
      .await?;
    let payment: PaymentResponse = Self::read_json(response).await?;
    Ok(payment.into())
  }

  #[instrument(name = "mercadopago::find_payment_by_reference", skip(self), err)]
  async fn find_payment_by_reference(&self, external_reference: &str) -> Result<Option<PaymentDetails>, GatewayError> {
    let response = self
      .http
      .get(format!("{}/v1/payments/search", self.api_base))
      .query(&[
        ("external_reference", external_reference),
        ("sort", "date_created"),
        ("criteria", "desc"),
        ("limit", "1"),
      ])
      .bearer_auth(&self.access_token)
      .send()
      .await?;
    let search: PaymentSearchResponse = Self::read_json(response).await?;
    Ok(search.results.into_iter().next().map(PaymentDetails::from))
  }
}
