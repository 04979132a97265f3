// storefront/src/pipelines/payment_notification_pipeline.rs

//! Reconciles an order with the gateway's view of its payment. Runs for
//! webhook deliveries and for status refreshes requested by the storefront.

use crate::errors::AppError;
use crate::models::{OrderStatus, PaymentDetails};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{NotificationSource, PaymentNotificationCtxData};
use crate::services::signature;
use flow::{ContextData, FlowRegistry, Pipeline, PipelineControl, SkipCondition};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const PAYMENT_TOPIC: &str = "payment";

pub fn register_payment_notification_pipeline(registry: &FlowRegistry<AppError>) {
  let skip_verify: SkipCondition<PaymentNotificationCtxData> = Arc::new(|ctx| {
    let guard = ctx.read();
    guard.is_poll() || guard.app_state.config.mercadopago.webhook_secret.is_none()
  });
  let skip_parse: SkipCondition<PaymentNotificationCtxData> = Arc::new(|ctx| ctx.read().is_poll());
  let skip_notify: SkipCondition<PaymentNotificationCtxData> = Arc::new(|ctx| !ctx.read().transitioned);

  let mut p = Pipeline::<PaymentNotificationCtxData, AppError>::new(&[
    ("verify_signature", false, Some(skip_verify)),
    ("parse_notification", false, Some(skip_parse)),
    ("fetch_payment", false, None),
    ("apply_payment", false, None),
    ("notify_payment_confirmed", true, Some(skip_notify)),
  ]);

  p.on_step("verify_signature", verify_signature);
  p.on_step("parse_notification", parse_notification);
  p.on_step("fetch_payment", fetch_payment);
  p.on_step("apply_payment", apply_payment);
  p.on_step(
    "notify_payment_confirmed",
    |ctx_data: ContextData<PaymentNotificationCtxData>| async move {
      let (state, order) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.order.clone())
      };
      if let Some(order) = order {
        let reports = common_steps::notify_payment_confirmed(&state, &order).await;
        ctx_data.write().notifications = reports;
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    },
  );

  registry.register(p);
}

/// Topic and payment id of a webhook delivery. The JSON body wins over the
/// query string; MercadoPago sends both shapes depending on the integration.
fn notification_fields(body: &serde_json::Value, query: &HashMap<String, String>) -> (Option<String>, Option<String>) {
  let text = |v: &serde_json::Value| match v {
    serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  };
  let topic = body
    .get("type")
    .and_then(text)
    .or_else(|| body.get("topic").and_then(text))
    .or_else(|| query.get("type").cloned())
    .or_else(|| query.get("topic").cloned());
  let data_id = body
    .get("data")
    .and_then(|d| d.get("id"))
    .and_then(text)
    .or_else(|| query.get("data.id").cloned())
    .or_else(|| query.get("id").cloned())
    .filter(|id| !id.trim().is_empty());
  (topic, data_id)
}

#[instrument(name = "step::verify_signature", skip_all, err)]
async fn verify_signature(ctx_data: ContextData<PaymentNotificationCtxData>) -> Result<PipelineControl, AppError> {
  let guard = ctx_data.read();
  let secret = match &guard.app_state.config.mercadopago.webhook_secret {
    Some(secret) => secret,
    None => return Ok(PipelineControl::Continue),
  };
  if let NotificationSource::Webhook {
    body,
    query,
    signature: header,
    request_id,
  } = &guard.source
  {
    // The signed manifest uses the id from the query string when present.
    let data_id = query
      .get("data.id")
      .cloned()
      .or_else(|| notification_fields(body, query).1);
    signature::verify(secret, header.as_deref(), request_id.as_deref(), data_id.as_deref()).map_err(|e| {
      warn!(error = %e, "Rejected webhook with a bad signature.");
      AppError::Auth(format!("Invalid webhook signature: {}", e))
    })?;
  }
  Ok(PipelineControl::Continue)
}

/// Non-payment topics are acknowledged without doing anything.
#[instrument(name = "step::parse_notification", skip_all, err)]
async fn parse_notification(ctx_data: ContextData<PaymentNotificationCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let (topic, data_id) = match &guard.source {
    NotificationSource::Webhook { body, query, .. } => notification_fields(body, query),
    NotificationSource::Poll { .. } => return Ok(PipelineControl::Continue),
  };
  guard.topic = topic.clone();

  match topic.as_deref() {
    Some(PAYMENT_TOPIC) => {}
    other => {
      info!(topic = ?other, "Ignoring non-payment notification.");
      guard.ignored_reason = Some(format!("topic {} is not handled", other.unwrap_or("<none>")));
      return Ok(PipelineControl::Stop);
    }
  }

  let payment_id = data_id.ok_or_else(|| AppError::Validation("Payment notification without data.id".to_string()))?;
  info!(payment_id = %payment_id, "Payment notification received.");
  guard.payment_id = Some(payment_id);
  Ok(PipelineControl::Continue)
}

/// Looks the payment up at the gateway and resolves the order it belongs to.
#[instrument(name = "step::fetch_payment", skip_all, err)]
async fn fetch_payment(ctx_data: ContextData<PaymentNotificationCtxData>) -> Result<PipelineControl, AppError> {
  let (state, source, payment_id) = {
    let guard = ctx_data.read();
    (guard.app_state.clone(), guard.source.clone(), guard.payment_id.clone())
  };

  let (payment, order) = match source {
    NotificationSource::Poll { order_id } => {
      let order = common_steps::load_order(&state, order_id).await?;
      let cached_id = order.payment_details.as_ref().map(|d| d.payment_id.clone());
      let cached = match cached_id {
        Some(id) => Some(state.gateway.get_payment(&id).await?),
        None => None,
      };
      // A rejected or abandoned payment may have been followed by a newer one
      // whose webhook never arrived.
      let payment = match cached {
        Some(payment) if payment.status.is_approved() => Some(payment),
        cached => {
          let latest = state.gateway.find_payment_by_reference(&order_id.to_string()).await?;
          if let (Some(old), Some(new)) = (&cached, &latest) {
            if old.payment_id != new.payment_id {
              info!(order_id = %order_id, cached = %old.payment_id, latest = %new.payment_id, "Newer payment found for order.");
            }
          }
          latest.or(cached)
        }
      };
      match payment {
        Some(payment) => (payment, order),
        None => {
          info!(order_id = %order_id, "No payment exists yet for this order.");
          let mut guard = ctx_data.write();
          guard.ignored_reason = Some("no payment found for order".to_string());
          guard.order = Some(order);
          return Ok(PipelineControl::Stop);
        }
      }
    }
    NotificationSource::Webhook { .. } => {
      let payment_id =
        payment_id.ok_or_else(|| AppError::Internal("fetch_payment reached without a payment id".to_string()))?;
      let payment = state.gateway.get_payment(&payment_id).await?;
      match resolve_reference(&payment) {
        Some(order_id) => match state.store.get(order_id).await? {
          Some(order) => (payment, order),
          None => return Ok(ignore(&ctx_data, &payment, "external_reference names an unknown order")),
        },
        None => return Ok(ignore(&ctx_data, &payment, "payment has no usable external_reference")),
      }
    }
  };

  info!(order_id = %order.id, payment_id = %payment.payment_id, payment_status = ?payment.status, "Payment fetched.");
  let mut guard = ctx_data.write();
  guard.payment_id = Some(payment.payment_id.clone());
  guard.payment = Some(payment);
  guard.order = Some(order);
  Ok(PipelineControl::Continue)
}

fn resolve_reference(payment: &PaymentDetails) -> Option<Uuid> {
  payment
    .external_reference
    .as_deref()
    .and_then(|r| Uuid::parse_str(r.trim()).ok())
}

fn ignore(ctx_data: &ContextData<PaymentNotificationCtxData>, payment: &PaymentDetails, reason: &str) -> PipelineControl {
  warn!(
    payment_id = %payment.payment_id,
    external_reference = ?payment.external_reference,
    reason,
    "Payment notification ignored."
  );
  ctx_data.write().ignored_reason = Some(reason.to_string());
  PipelineControl::Stop
}

/// Caches the payment on the order and, for an approved payment, moves the
/// order to `pagado`. Only the run that wins the conditional update sets
/// `transitioned`.
#[instrument(name = "step::apply_payment", skip_all, err)]
async fn apply_payment(ctx_data: ContextData<PaymentNotificationCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order_id, payment) = {
    let guard = ctx_data.read();
    let order_id = guard.order.as_ref().map(|o| o.id);
    match (order_id, guard.payment.clone()) {
      (Some(order_id), Some(payment)) => (guard.app_state.clone(), order_id, payment),
      _ => return Err(AppError::Internal("apply_payment reached without order and payment".to_string())),
    }
  };

  let mut order = state
    .store
    .record_payment(order_id, &payment)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

  let mut transitioned = false;
  if payment.status.is_approved() {
    match state.store.mark_paid_if(order_id, &OrderStatus::PAYABLE).await? {
      Some(paid) => {
        info!(order_id = %order_id, payment_id = %payment.payment_id, "Order marked as pagado.");
        order = paid;
        transitioned = true;
      }
      None => {
        info!(order_id = %order_id, status = %order.status, "Approved payment already applied; no transition.");
      }
    }
  }

  let mut guard = ctx_data.write();
  guard.order = Some(order);
  guard.transitioned = transitioned;
  Ok(PipelineControl::Continue)
}
