// storefront/src/pipelines/admin_status_pipeline.rs

//! Manual status changes from the back office (shipping, delivery,
//! cancellation, confirming WhatsApp payments).

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::AdminStatusCtxData;
use flow::{ContextData, FlowRegistry, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument};

pub fn register_admin_status_pipeline(registry: &FlowRegistry<AppError>) {
  let skip_notify: SkipCondition<AdminStatusCtxData> = Arc::new(|ctx| !ctx.read().transitioned_to_paid);

  let mut p = Pipeline::<AdminStatusCtxData, AppError>::new(&[
    ("load_order", false, None),
    ("validate_transition", false, None),
    ("apply_transition", false, None),
    ("notify_payment_confirmed", true, Some(skip_notify)),
  ]);

  p.on_step("load_order", |ctx_data: ContextData<AdminStatusCtxData>| async move {
    let (state, order_id) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.order_id)
    };
    let order = common_steps::load_order(&state, order_id).await?;
    ctx_data.write().order = Some(order);
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_step("validate_transition", validate_transition);
  p.on_step("apply_transition", apply_transition);
  p.on_step("notify_payment_confirmed", |ctx_data: ContextData<AdminStatusCtxData>| async move {
    let (state, order) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.updated_order.clone())
    };
    if let Some(order) = order {
      let reports = common_steps::notify_payment_confirmed(&state, &order).await;
      ctx_data.write().notifications = reports;
    }
    Ok::<_, AppError>(PipelineControl::Continue)
  });

  registry.register(p);
}

async fn validate_transition(ctx_data: ContextData<AdminStatusCtxData>) -> Result<PipelineControl, AppError> {
  let guard = ctx_data.read();
  let order = guard
    .order
    .as_ref()
    .ok_or_else(|| AppError::Internal("validate_transition reached without an order".to_string()))?;
  let allow_reentry = guard.app_state.config.allow_cancelled_reentry;
  if !order.status.can_transition_to(guard.requested, allow_reentry) {
    return Err(AppError::Conflict(format!(
      "Order {} cannot move from {} to {}",
      order.id, order.status, guard.requested
    )));
  }
  Ok(PipelineControl::Continue)
}

/// Conditional update keyed on the status read in `load_order`; losing a race
/// to another writer surfaces as a conflict.
#[instrument(name = "step::apply_transition", skip_all, err)]
async fn apply_transition(ctx_data: ContextData<AdminStatusCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order_id, current, requested) = {
    let guard = ctx_data.read();
    let current = guard
      .order
      .as_ref()
      .map(|o| o.status)
      .ok_or_else(|| AppError::Internal("apply_transition reached without an order".to_string()))?;
    (guard.app_state.clone(), guard.order_id, current, guard.requested)
  };

  let updated = if requested == OrderStatus::Pagado {
    state.store.mark_paid_if(order_id, &[current]).await?
  } else {
    state.store.update_status_if(order_id, current, requested).await?
  };
  let updated = updated.ok_or_else(|| {
    AppError::Conflict(format!("Order {} changed while its status was being updated", order_id))
  })?;

  info!(order_id = %order_id, from = %current, to = %requested, "Order status changed by admin.");
  let mut guard = ctx_data.write();
  guard.transitioned_to_paid = requested == OrderStatus::Pagado;
  guard.updated_order = Some(updated);
  Ok(PipelineControl::Continue)
}
