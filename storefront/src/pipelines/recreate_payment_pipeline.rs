// storefront/src/pipelines/recreate_payment_pipeline.rs

//! Opens a fresh checkout for an unpaid MercadoPago order, for customers whose
//! first attempt failed, expired or was cancelled.

use crate::errors::AppError;
use crate::models::{OrderStatus, PaymentMethod};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{PreferenceCtxData, RecreatePaymentCtxData};
use crate::pipelines::payment_arms::preference_pipeline;
use flow::{ContextData, FlowError, FlowRegistry, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument};

pub fn register_recreate_payment_pipeline(registry: &FlowRegistry<AppError>) {
  // Orders whose checkout never reached the gateway were not announced yet.
  let skip_notify: SkipCondition<RecreatePaymentCtxData> = Arc::new(|ctx| {
    let guard = ctx.read();
    guard.updated_order.as_ref().map_or(true, |order| order.payment_attempts != 1)
  });

  let mut p = Pipeline::<RecreatePaymentCtxData, AppError>::new(&[
    ("load_order", false, None),
    ("check_recreatable", false, None),
    ("request_payment", false, None),
    ("notify_order_created", true, Some(skip_notify)),
  ]);

  p.on_step("load_order", |ctx_data: ContextData<RecreatePaymentCtxData>| async move {
    let (state, order_id) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.order_id)
    };
    let order = common_steps::load_order(&state, order_id).await?;
    ctx_data.write().order = Some(order);
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_step("check_recreatable", check_recreatable);

  p.branch_step("request_payment")
    .when(
      "mercadopago",
      |ctx| ctx.read().preference.is_some(),
      preference_pipeline(),
      |ctx| {
        let preference = ctx.read().preference.clone();
        preference.ok_or_else(|| FlowError::Internal("preference context missing".to_string()))
      },
    )
    .otherwise_fail()
    .finish(false);
  p.after_step("request_payment", collect_preference);

  p.on_step("notify_order_created", |ctx_data: ContextData<RecreatePaymentCtxData>| async move {
    let (state, order) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.updated_order.clone())
    };
    if let Some(order) = order {
      let reports = common_steps::notify_order_created(&state, &order).await;
      ctx_data.write().notifications = reports;
    }
    Ok::<_, AppError>(PipelineControl::Continue)
  });

  registry.register(p);
}

/// Allowed: MercadoPago orders in `pendiente`, or in `cancelado` when
/// re-entry is enabled. Prepares the preference sub-context on success.
#[instrument(name = "step::check_recreatable", skip_all, err)]
async fn check_recreatable(ctx_data: ContextData<RecreatePaymentCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let order = guard
    .order
    .clone()
    .ok_or_else(|| AppError::Internal("check_recreatable reached without an order".to_string()))?;

  if order.payment_method != PaymentMethod::MercadoPago {
    return Err(AppError::Conflict(format!(
      "Order {} is paid through {}; there is no online payment to recreate",
      order.id, order.payment_method
    )));
  }

  let allow_reentry = guard.app_state.config.allow_cancelled_reentry;
  let expected = match order.status {
    OrderStatus::Pendiente => vec![OrderStatus::Pendiente],
    OrderStatus::Cancelado if allow_reentry => vec![OrderStatus::Cancelado],
    status => {
      return Err(AppError::Conflict(format!(
        "Order {} is {}; a new payment cannot be created",
        order.id, status
      )));
    }
  };

  info!(order_id = %order.id, status = %order.status, attempt = order.payment_attempts + 1, "Recreating payment.");
  let state = guard.app_state.clone();
  guard.preference = Some(ContextData::new(PreferenceCtxData::new(state, order, expected)));
  Ok(PipelineControl::Continue)
}

/// Unlike checkout, a gateway failure here fails the request.
async fn collect_preference(ctx_data: ContextData<RecreatePaymentCtxData>) -> Result<PipelineControl, AppError> {
  let (order_id, preference) = {
    let guard = ctx_data.read();
    (guard.order_id, guard.preference.clone())
  };
  let Some(preference) = preference else {
    return Ok(PipelineControl::Continue);
  };
  let sub = preference.snapshot();
  if let Some(message) = sub.gateway_error {
    return Err(AppError::Gateway {
      message,
      order_id: Some(order_id),
    });
  }
  let mut guard = ctx_data.write();
  guard.links = sub.links;
  guard.updated_order = sub.updated_order;
  Ok(PipelineControl::Continue)
}
