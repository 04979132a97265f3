// storefront/src/pipelines/resend_confirmation_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::ResendConfirmationCtxData;
use crate::services::notifications::EmailTemplate;
use flow::{ContextData, FlowRegistry, Pipeline, PipelineControl};
use tracing::{info, instrument};

/// `load_order -> check_paid -> send_confirmation`. Never writes to the store
/// and never fails because of the mail provider; the delivery report says
/// what happened.
pub fn register_resend_confirmation_pipeline(registry: &FlowRegistry<AppError>) {
  let mut p = Pipeline::<ResendConfirmationCtxData, AppError>::new(&[
    ("load_order", false, None),
    ("check_paid", false, None),
    ("send_confirmation", false, None),
  ]);

  p.on_step("load_order", |ctx_data: ContextData<ResendConfirmationCtxData>| async move {
    let (state, order_id) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.order_id)
    };
    let order = common_steps::load_order(&state, order_id).await?;
    ctx_data.write().order = Some(order);
    Ok::<_, AppError>(PipelineControl::Continue)
  });
  p.on_step("check_paid", check_paid);
  p.on_step("send_confirmation", send_confirmation);

  registry.register(p);
}

async fn check_paid(ctx_data: ContextData<ResendConfirmationCtxData>) -> Result<PipelineControl, AppError> {
  let guard = ctx_data.read();
  match &guard.order {
    Some(order) if order.status.is_paid() => Ok(PipelineControl::Continue),
    Some(order) => Err(AppError::Conflict(format!(
      "Order {} is {}; only paid orders have a payment confirmation",
      order.id, order.status
    ))),
    None => Err(AppError::Internal("check_paid reached without an order".to_string())),
  }
}

#[instrument(name = "step::send_confirmation", skip_all, err)]
async fn send_confirmation(ctx_data: ContextData<ResendConfirmationCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order) = {
    let guard = ctx_data.read();
    let order = guard
      .order
      .clone()
      .ok_or_else(|| AppError::Internal("send_confirmation reached without an order".to_string()))?;
    (guard.app_state.clone(), order)
  };
  let report = state.notifier.send(EmailTemplate::PaymentConfirmation, &order).await;
  info!(order_id = %order.id, success = report.success, attempts = report.attempts, "Confirmation resent.");
  ctx_data.write().report = Some(report);
  Ok(PipelineControl::Continue)
}
