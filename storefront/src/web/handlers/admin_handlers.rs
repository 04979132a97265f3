// storefront/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use flow::ContextData;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::contexts::AdminStatusCtxData;
use crate::state::AppState;
use crate::web::dto::{AdminStatusRequest, AdminStatusResponse};

/// Checks `Authorization: Bearer <ADMIN_API_TOKEN>`. With no token configured
/// the admin API is closed.
fn authorize_admin(req: &HttpRequest, state: &AppState) -> Result<(), AppError> {
  let expected = state
    .config
    .admin_api_token
    .as_deref()
    .ok_or_else(|| AppError::Auth("Admin API is disabled".to_string()))?;
  let provided = req
    .headers()
    .get(actix_web::http::header::AUTHORIZATION)
    .and_then(|h| h.to_str().ok())
    .and_then(|h| h.strip_prefix("Bearer "))
    .ok_or_else(|| AppError::Auth("Missing bearer token".to_string()))?;

  // Compare MACs of both tokens so the check takes the same time for any input.
  let keyed = |token: &str| -> Result<Hmac<Sha256>, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(expected.as_bytes())
      .map_err(|e| AppError::Internal(format!("Admin token MAC: {}", e)))?;
    mac.update(token.as_bytes());
    Ok(mac)
  };
  let expected_tag = keyed(expected)?.finalize().into_bytes();
  keyed(provided.trim())?.verify_slice(&expected_tag).map_err(|_| {
    warn!("Admin request with an invalid token.");
    AppError::Auth("Invalid admin token".to_string())
  })
}

/// `PATCH /api/admin/orders/{id}/status` with `{"status": "..."}`.
#[instrument(name = "handler::admin_update_status", skip(app_state, req, body), fields(requested = %body.status))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  path: web::Path<Uuid>,
  body: web::Json<AdminStatusRequest>,
) -> Result<HttpResponse, AppError> {
  authorize_admin(&req, &app_state)?;

  let order_id = path.into_inner();
  let ctx_data = ContextData::new(AdminStatusCtxData::new(
    app_state.get_ref().clone(),
    order_id,
    body.into_inner().status,
  ));
  app_state.flows.run(ctx_data.clone()).await?;

  let ctx = ctx_data.snapshot();
  match (ctx.order, ctx.updated_order) {
    (Some(previous), Some(updated)) => {
      info!(order_id = %order_id, from = %previous.status, to = %updated.status, "Admin status change applied.");
      Ok(HttpResponse::Ok().json(AdminStatusResponse {
        order_id,
        previous_status: previous.status,
        status: updated.status,
        notifications: ctx.notifications,
      }))
    }
    _ => Err(AppError::Internal("Status change finished without an updated order".to_string())),
  }
}
