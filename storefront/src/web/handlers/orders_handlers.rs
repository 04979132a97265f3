// storefront/src/web/handlers/orders_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use flow::ContextData;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::PaymentMethod;
use crate::pipelines::common_steps::load_order;
use crate::pipelines::contexts::{
  CheckoutCtxData, CheckoutRequest, NotificationSource, PaymentNotificationCtxData, RecreatePaymentCtxData,
  ResendConfirmationCtxData,
};
use crate::services::whatsapp::whatsapp_link;
use crate::state::AppState;
use crate::web::dto::{
  CreateOrderRequest, CreateOrderResponse, OrderQuery, OrderResponse, RecreatePaymentResponse,
  ResendConfirmationResponse, WhatsAppLinkResponse,
};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// `POST /api/orders`. 201 for a new order, 200 when the idempotency key was
/// already used, 502 (with the order id) when the order was stored but the
/// gateway could not open a checkout.
#[instrument(
  name = "handler::create_order",
  skip(app_state, req, body),
  fields(payment_method = %body.payment_method, items = body.items.len())
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
  let body = body.into_inner();
  let idempotency_key = body
    .idempotency_key
    .filter(|k| !k.trim().is_empty())
    .or_else(|| {
      req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
    })
    .unwrap_or_default();

  let request = CheckoutRequest {
    items: body.items,
    declared_total: body.total_amount,
    payment_method: body.payment_method,
    shipping_info: body.shipping_info,
    idempotency_key,
    user_id: body.user_id,
  };
  let ctx_data = ContextData::new(CheckoutCtxData::new(app_state.get_ref().clone(), request));

  app_state.flows.run(ctx_data.clone()).await?;

  let ctx = ctx_data.snapshot();
  let order = ctx
    .order
    .ok_or_else(|| AppError::Internal("Checkout finished without an order".to_string()))?;

  if let Some(message) = ctx.gateway_error {
    return Err(AppError::Gateway {
      message,
      order_id: Some(order.id),
    });
  }

  info!(order_id = %order.id, status = %order.status, replayed = ctx.replayed, "Checkout finished.");
  let response = CreateOrderResponse {
    order_id: order.id,
    status: order.status,
    total_amount: order.total_amount,
    replayed: ctx.replayed,
    payment_info: ctx.payment_links,
    whatsapp_link: ctx.whatsapp_link,
    notifications: ctx.notifications,
  };
  if ctx.replayed {
    Ok(HttpResponse::Ok().json(response))
  } else {
    Ok(HttpResponse::Created().json(response))
  }
}

/// `GET /api/orders/{id}`; `?refresh=true` reconciles with the gateway first.
/// A failed refresh still returns the stored order.
#[instrument(name = "handler::get_order", skip(app_state, query), fields(refresh = query.refresh))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  query: web::Query<OrderQuery>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let order = load_order(&app_state, order_id).await?;

  if !query.refresh || order.payment_method != PaymentMethod::MercadoPago {
    return Ok(HttpResponse::Ok().json(OrderResponse {
      order,
      refreshed: false,
      refresh_error: None,
    }));
  }

  let ctx_data = ContextData::new(PaymentNotificationCtxData::new(
    app_state.get_ref().clone(),
    NotificationSource::Poll { order_id },
  ));
  match app_state.flows.run(ctx_data.clone()).await {
    Ok(_) => {
      let refreshed = ctx_data.read().order.clone().unwrap_or(order);
      Ok(HttpResponse::Ok().json(OrderResponse {
        order: refreshed,
        refreshed: true,
        refresh_error: None,
      }))
    }
    Err(AppError::Gateway { message, .. }) => {
      warn!(order_id = %order_id, error = %message, "Payment refresh failed; returning stored order.");
      Ok(HttpResponse::Ok().json(OrderResponse {
        order,
        refreshed: false,
        refresh_error: Some(message),
      }))
    }
    Err(e) => Err(e),
  }
}

/// `POST /api/orders/{id}/payment`.
#[instrument(name = "handler::recreate_payment", skip(app_state))]
pub async fn recreate_payment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let ctx_data = ContextData::new(RecreatePaymentCtxData::new(app_state.get_ref().clone(), order_id));
  app_state.flows.run(ctx_data.clone()).await?;

  let ctx = ctx_data.snapshot();
  match (ctx.updated_order, ctx.links) {
    (Some(order), Some(links)) => Ok(HttpResponse::Ok().json(RecreatePaymentResponse {
      order_id: order.id,
      status: order.status,
      payment_attempts: order.payment_attempts,
      payment_info: links,
      notifications: ctx.notifications,
    })),
    _ => Err(AppError::Internal("Payment recreation finished without a preference".to_string())),
  }
}

/// `POST /api/orders/{id}/resend-confirmation`. Delivery failures are
/// reported in the body with a 200.
#[instrument(name = "handler::resend_confirmation", skip(app_state))]
pub async fn resend_confirmation_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let ctx_data = ContextData::new(ResendConfirmationCtxData::new(app_state.get_ref().clone(), order_id));
  app_state.flows.run(ctx_data.clone()).await?;

  let report = ctx_data
    .read()
    .report
    .clone()
    .ok_or_else(|| AppError::Internal("Resend finished without a delivery report".to_string()))?;
  Ok(HttpResponse::Ok().json(ResendConfirmationResponse {
    order_id,
    delivery: report,
  }))
}

/// `GET /api/orders/{id}/whatsapp-link`.
#[instrument(name = "handler::whatsapp_link", skip(app_state))]
pub async fn whatsapp_link_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = load_order(&app_state, path.into_inner()).await?;
  let config = &app_state.config;
  let link = whatsapp_link(&config.whatsapp_number, &order, &config.mercadopago.currency_id);
  Ok(HttpResponse::Ok().json(WhatsAppLinkResponse {
    order_id: order.id,
    whatsapp_link: link,
  }))
}
