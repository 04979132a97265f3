// storefront/src/web/routes.rs

use crate::errors::AppError;
use crate::web::handlers::{admin_handlers, orders_handlers, webhook_handlers};
use actix_web::{error::JsonPayloadError, web, HttpRequest};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed JSON bodies answer with the same error shape as everything else.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
  AppError::Validation(format!("Invalid request body: {}", err)).into()
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler));
  cfg.service(
    web::scope("/api")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(orders_handlers::create_order_handler))
          .route("/{order_id}", web::get().to(orders_handlers::get_order_handler))
          .route(
            "/{order_id}/payment",
            web::post().to(orders_handlers::recreate_payment_handler),
          )
          .route(
            "/{order_id}/resend-confirmation",
            web::post().to(orders_handlers::resend_confirmation_handler),
          )
          .route(
            "/{order_id}/whatsapp-link",
            web::get().to(orders_handlers::whatsapp_link_handler),
          ),
      )
      .service(
        web::scope("/webhooks").route(
          "/mercadopago",
          web::post().to(webhook_handlers::mercadopago_webhook_handler),
        ),
      )
      .service(
        web::scope("/admin").route(
          "/orders/{order_id}/status",
          web::patch().to(admin_handlers::update_order_status_handler),
        ),
      ),
  );
}
