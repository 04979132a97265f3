// storefront/src/pipelines/checkout_pipeline.rs

use crate::errors::AppError;
use crate::models::{compute_total, Order, OrderStatus, PaymentMethod};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{CheckoutCtxData, PaymentRoute, PreferenceCtxData, WhatsAppCtxData};
use crate::pipelines::payment_arms::{preference_pipeline, whatsapp_pipeline};
use crate::services::whatsapp::whatsapp_link;
use crate::store::InsertOutcome;
use flow::{ContextData, FlowError, FlowRegistry, Pipeline, PipelineControl, SkipCondition};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Decimal places a price may carry; orders store amounts as `NUMERIC(12, 2)`.
const PRICE_SCALE: u32 = 2;

pub fn register_checkout_pipeline(registry: &FlowRegistry<AppError>) {
  // MercadoPago orders are announced when their first preference is stored.
  // Replays and recreate-payment can be where that happens.
  let skip_notify: SkipCondition<CheckoutCtxData> = Arc::new(|ctx| {
    let guard = ctx.read();
    match &guard.order {
      None => true,
      Some(_) if guard.gateway_error.is_some() => true,
      Some(order) => order.payment_method == PaymentMethod::MercadoPago && order.payment_attempts != 1,
    }
  });

  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("validate_checkout", false, None),
    ("persist_order", false, None),
    ("route_payment_method", false, None),
    ("notify_order_created", true, Some(skip_notify)),
  ]);

  p.on_step("validate_checkout", validate_checkout);
  p.on_step("persist_order", persist_order);

  p.before_step("route_payment_method", init_payment_route);
  p.branch_step("route_payment_method")
    .when(
      "mercadopago",
      |ctx| matches!(ctx.read().payment_route, PaymentRoute::MercadoPago(_)),
      preference_pipeline(),
      |ctx| {
        let route = ctx.read().payment_route.clone();
        match route {
          PaymentRoute::MercadoPago(sub) => Ok(sub),
          _ => Err(FlowError::Internal("mercadopago route without its context".to_string())),
        }
      },
    )
    .when(
      "whatsapp",
      |ctx| matches!(ctx.read().payment_route, PaymentRoute::WhatsApp(_)),
      whatsapp_pipeline(),
      |ctx| {
        let route = ctx.read().payment_route.clone();
        match route {
          PaymentRoute::WhatsApp(sub) => Ok(sub),
          _ => Err(FlowError::Internal("whatsapp route without its context".to_string())),
        }
      },
    )
    .otherwise_fail()
    .finish(false);
  p.after_step("route_payment_method", collect_payment_route);

  p.on_step("notify_order_created", |ctx_data: ContextData<CheckoutCtxData>| async move {
    let (state, order) = {
      let guard = ctx_data.read();
      (guard.app_state.clone(), guard.order.clone())
    };
    if let Some(order) = order {
      let reports = common_steps::notify_order_created(&state, &order).await;
      ctx_data.write().notifications.extend(reports);
    }
    Ok::<_, AppError>(PipelineControl::Continue)
  });

  registry.register(p);
}

/// Rejects malformed carts and shipping data. Nothing is persisted on failure.
#[instrument(name = "step::validate_checkout", skip_all, err)]
async fn validate_checkout(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let guard = ctx_data.read();
  let request = &guard.request;

  if request.idempotency_key.trim().is_empty() {
    return Err(AppError::Validation("idempotencyKey is required".to_string()));
  }
  if request.items.is_empty() {
    return Err(AppError::Validation("The cart is empty".to_string()));
  }
  for (idx, item) in request.items.iter().enumerate() {
    if item.quantity == 0 {
      return Err(AppError::Validation(format!("items[{}].quantity must be positive", idx)));
    }
    if item.price < Decimal::ZERO {
      return Err(AppError::Validation(format!("items[{}].price must not be negative", idx)));
    }
    if item.price.normalize().scale() > PRICE_SCALE {
      return Err(AppError::Validation(format!(
        "items[{}].price has more than {} decimal places",
        idx, PRICE_SCALE
      )));
    }
    if item.product_id.trim().is_empty() || item.title.trim().is_empty() {
      return Err(AppError::Validation(format!("items[{}] needs productId and title", idx)));
    }
  }
  if let Some((field, _)) = request.shipping_info.fields().iter().find(|(_, v)| v.trim().is_empty()) {
    return Err(AppError::Validation(format!("shippingInfo.{} is required", field)));
  }
  request
    .shipping_info
    .validate()
    .map_err(|e| AppError::Validation(format!("Invalid shipping info: {}", e)))?;

  let computed = compute_total(&request.items);
  if let Some(declared) = request.declared_total {
    if declared != computed {
      return Err(AppError::Validation(format!(
        "totalAmount {} does not match the cart total {}",
        declared, computed
      )));
    }
  }
  Ok(PipelineControl::Continue)
}

/// Inserts the order under its idempotency key. A replayed key stops the run
/// with the original order and no further side effects, except for a
/// MercadoPago order that never got a checkout link: that one is routed to
/// the gateway again.
#[instrument(name = "step::persist_order", skip_all, err)]
async fn persist_order(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order) = {
    let guard = ctx_data.read();
    let request = guard.request.clone();
    let order = Order::place(
      request.items,
      request.shipping_info,
      request.payment_method,
      request.idempotency_key.trim().to_string(),
      request.user_id,
    );
    (guard.app_state.clone(), order)
  };

  match state.store.insert_or_get(order).await? {
    InsertOutcome::Created(order) => {
      info!(order_id = %order.id, payment_method = %order.payment_method, total = %order.total_amount, "Order created.");
      ctx_data.write().order = Some(order);
      Ok(PipelineControl::Continue)
    }
    InsertOutcome::Existing(order) if awaits_payment_link(&order) => {
      info!(order_id = %order.id, "Idempotency key replayed for an order without a payment link; retrying the gateway.");
      let mut guard = ctx_data.write();
      guard.replayed = true;
      guard.order = Some(order);
      Ok(PipelineControl::Continue)
    }
    InsertOutcome::Existing(order) => {
      info!(order_id = %order.id, "Idempotency key replayed; returning existing order.");
      let link = (order.payment_method == PaymentMethod::WhatsApp).then(|| {
        whatsapp_link(&state.config.whatsapp_number, &order, &state.config.mercadopago.currency_id)
      });
      let mut guard = ctx_data.write();
      guard.replayed = true;
      guard.payment_links = order.payment_links();
      guard.whatsapp_link = link;
      guard.order = Some(order);
      Ok(PipelineControl::Stop)
    }
  }
}

async fn init_payment_route(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let order = guard
    .order
    .clone()
    .ok_or_else(|| AppError::Internal("route_payment_method reached without an order".to_string()))?;
  let state = guard.app_state.clone();
  guard.payment_route = match order.payment_method {
    PaymentMethod::MercadoPago => PaymentRoute::MercadoPago(ContextData::new(PreferenceCtxData::new(
      state,
      order,
      vec![OrderStatus::Pendiente],
    ))),
    PaymentMethod::WhatsApp => PaymentRoute::WhatsApp(ContextData::new(WhatsAppCtxData {
      app_state: state,
      order,
      link: None,
    })),
  };
  Ok(PipelineControl::Continue)
}

fn awaits_payment_link(order: &Order) -> bool {
  order.payment_method == PaymentMethod::MercadoPago
    && order.status == OrderStatus::Pendiente
    && order.payment_links().is_none()
}

/// Copies the arm's results back onto the checkout context.
async fn collect_payment_route(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let route = ctx_data.read().payment_route.clone();
  match route {
    PaymentRoute::MercadoPago(sub) => {
      let sub = sub.read();
      let mut guard = ctx_data.write();
      if let Some(err) = &sub.gateway_error {
        warn!(order_id = ?guard.order.as_ref().map(|o| o.id), error = %err, "Checkout finished without a payment link.");
      }
      guard.gateway_error = sub.gateway_error.clone();
      guard.payment_links = sub.links.clone();
      if let Some(updated) = &sub.updated_order {
        guard.order = Some(updated.clone());
      }
    }
    PaymentRoute::WhatsApp(sub) => {
      let link = sub.read().link.clone();
      ctx_data.write().whatsapp_link = link;
    }
    PaymentRoute::None => {}
  }
  Ok(PipelineControl::Continue)
}
