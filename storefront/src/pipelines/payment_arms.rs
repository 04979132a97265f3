// storefront/src/pipelines/payment_arms.rs

//! Sub-pipelines run by the payment branch of checkout and by recreate-payment.

use crate::errors::AppError;
use crate::pipelines::contexts::{PreferenceCtxData, WhatsAppCtxData};
use crate::services::mercadopago::{resolve_preference, BackUrls, PreferenceRequest};
use crate::services::whatsapp::whatsapp_link;
use flow::{ContextData, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// `request_preference -> store_preference`. A gateway failure is recorded
/// in `gateway_error` and `store_preference` is then skipped, leaving the
/// order untouched.
pub fn preference_pipeline() -> Arc<Pipeline<PreferenceCtxData, AppError>> {
  let skip_on_gateway_error: SkipCondition<PreferenceCtxData> = Arc::new(|ctx| ctx.read().gateway_error.is_some());
  let mut p = Pipeline::<PreferenceCtxData, AppError>::new(&[
    ("request_preference", false, None),
    ("store_preference", false, Some(skip_on_gateway_error)),
  ]);
  p.on_step("request_preference", request_preference);
  p.on_step("store_preference", store_preference);
  Arc::new(p)
}

/// WhatsApp orders are stored as `whatsapp_pendiente` up front, so this arm
/// only prepares the deep link.
pub fn whatsapp_pipeline() -> Arc<Pipeline<WhatsAppCtxData, AppError>> {
  let mut p = Pipeline::<WhatsAppCtxData, AppError>::new(&[("compose_whatsapp_link", false, None)]);
  p.on_step("compose_whatsapp_link", compose_whatsapp_link);
  Arc::new(p)
}

#[instrument(name = "step::request_preference", skip_all, err)]
async fn request_preference(ctx_data: ContextData<PreferenceCtxData>) -> Result<PipelineControl, AppError> {
  let (state, request) = {
    let guard = ctx_data.read();
    let config = &guard.app_state.config;
    let order = &guard.order;
    let base = &config.app_base_url;
    let request = PreferenceRequest {
      order_id: order.id,
      items: order.items.clone(),
      total_amount: order.total_amount,
      payer_name: order.shipping_info.name.clone(),
      payer_email: order.shipping_info.email.clone(),
      currency_id: config.mercadopago.currency_id.clone(),
      back_urls: BackUrls {
        success: format!("{}/checkout/success?orderId={}", base, order.id),
        failure: format!("{}/checkout/failure?orderId={}", base, order.id),
        pending: format!("{}/checkout/pending?orderId={}", base, order.id),
      },
      notification_url: format!("{}/api/webhooks/mercadopago", base),
      idempotency_key: format!("{}-{}", order.id, order.payment_attempts + 1),
    };
    (guard.app_state.clone(), request)
  };

  let outcome = match state.gateway.create_preference(&request).await {
    Ok(preference) => resolve_preference(preference, state.config.app_env),
    Err(e) => Err(e),
  };

  match outcome {
    Ok(links) => {
      info!(order_id = %request.order_id, preference_id = %links.preference_id, "Payment preference ready.");
      ctx_data.write().links = Some(links);
    }
    Err(e) => {
      warn!(order_id = %request.order_id, error = %e, "Payment preference could not be created; order stays pendiente.");
      ctx_data.write().gateway_error = Some(e.to_string());
    }
  }
  Ok(PipelineControl::Continue)
}

async fn store_preference(ctx_data: ContextData<PreferenceCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order_id, links, expected) = {
    let guard = ctx_data.read();
    let links = guard
      .links
      .clone()
      .ok_or_else(|| AppError::Internal("preference links missing after request_preference".to_string()))?;
    (guard.app_state.clone(), guard.order.id, links, guard.expected_statuses.clone())
  };

  let updated = state
    .store
    .save_preference(order_id, &links, &expected)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Order {} changed while its payment was being created", order_id)))?;
  ctx_data.write().updated_order = Some(updated);
  Ok(PipelineControl::Continue)
}

async fn compose_whatsapp_link(ctx_data: ContextData<WhatsAppCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let config = guard.app_state.config.clone();
  let link = whatsapp_link(&config.whatsapp_number, &guard.order, &config.mercadopago.currency_id);
  info!(order_id = %guard.order.id, "Order flagged for WhatsApp follow-up.");
  guard.link = Some(link);
  Ok(PipelineControl::Continue)
}
