// storefront/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use flow::{ContextData, PipelineResult};
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::pipelines::contexts::{NotificationSource, PaymentNotificationCtxData};
use crate::state::AppState;
use crate::web::dto::WebhookAck;

fn header(req: &HttpRequest, name: &str) -> Option<String> {
  req
    .headers()
    .get(name)
    .and_then(|h| h.to_str().ok())
    .map(str::to_string)
}

/// `POST /api/webhooks/mercadopago`.
///
/// Acknowledged notifications (handled, duplicate, or not about a payment)
/// get a 200. Signature failures answer 401; gateway failures answer 502 so
/// MercadoPago delivers the notification again later.
#[instrument(
  name = "handler::mercadopago_webhook",
  skip(app_state, req, query, body),
  fields(request_id = ?header(&req, "x-request-id"), payload_bytes = body.len())
)]
pub async fn mercadopago_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  query: web::Query<HashMap<String, String>>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  // Some deliveries carry everything in the query string and an empty body.
  let payload = if body.is_empty() {
    serde_json::Value::Null
  } else {
    serde_json::from_slice(&body).map_err(|e| AppError::Validation(format!("Webhook body is not JSON: {}", e)))?
  };

  let source = NotificationSource::Webhook {
    body: payload,
    query: query.into_inner(),
    signature: header(&req, "x-signature"),
    request_id: header(&req, "x-request-id"),
  };
  let ctx_data = ContextData::new(PaymentNotificationCtxData::new(app_state.get_ref().clone(), source));

  let result = app_state.flows.run(ctx_data.clone()).await?;

  let ctx = ctx_data.read();
  let ack = WebhookAck {
    received: true,
    transitioned: ctx.transitioned,
    order_id: ctx.order.as_ref().map(|o| o.id),
    ignored: ctx.ignored_reason.clone(),
  };
  match result {
    PipelineResult::Completed => info!(order_id = ?ack.order_id, transitioned = ack.transitioned, "Webhook processed."),
    PipelineResult::Stopped => info!(reason = ?ack.ignored, "Webhook acknowledged without changes."),
  }
  Ok(HttpResponse::Ok().json(ack))
}
