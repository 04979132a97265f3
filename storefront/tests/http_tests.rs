// storefront/tests/http_tests.rs
mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::*;
use serde_json::{json, Value};
use serial_test::serial;
use tienda::models::PaymentStatus;
use uuid::Uuid;

macro_rules! init_app {
  ($ctx:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($ctx.state.clone()))
        .configure(tienda::web::configure_app_routes),
    )
    .await
  };
}

fn order_body(key: Option<&str>, method: &str) -> Value {
  let mut body = json!({
    "items": [
      {"productId": "yerba-1kg", "title": "Yerba mate 1kg", "quantity": 2, "price": 10.00},
      {"productId": "bombilla", "title": "Bombilla", "quantity": 1, "price": 5.00}
    ],
    "totalAmount": 25.00,
    "paymentMethod": method,
    "shippingInfo": {
      "name": "Ana Gómez",
      "email": CUSTOMER_EMAIL,
      "phone": "+54 11 5555-1234",
      "address": "Av. Corrientes 1234",
      "city": "Buenos Aires",
      "postalCode": "C1043"
    }
  });
  if let Some(key) = key {
    body["idempotencyKey"] = json!(key);
  }
  body
}

fn order_id_of(body: &Value) -> Uuid {
  body["orderId"].as_str().and_then(|s| Uuid::parse_str(s).ok()).expect("orderId")
}

#[actix_rt::test]
#[serial]
async fn health_check_responds_ok() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);
  let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
#[serial]
async fn create_order_then_replay_with_header_key() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .insert_header(("Idempotency-Key", "k1"))
    .set_json(order_body(None, "mercadopago"))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let created: Value = test::read_body_json(resp).await;
  assert_eq!(created["status"], "pendiente");
  assert_eq!(created["replayed"], false);
  assert!(created["paymentInfo"]["redirectUrl"].as_str().is_some_and(|u| !u.is_empty()));
  assert_eq!(created["notifications"].as_array().map(Vec::len), Some(2));

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k1"), "mercadopago"))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let replayed: Value = test::read_body_json(resp).await;
  assert_eq!(replayed["replayed"], true);
  assert_eq!(order_id_of(&replayed), order_id_of(&created));
  assert_eq!(ctx.store.len(), 1);
}

#[actix_rt::test]
#[serial]
async fn gateway_failure_answers_502_with_pending_order() {
  let ctx = TestApp::new();
  ctx.gateway.set_fail_preferences(true);
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k1"), "mercadopago"))
    .to_request();
  let resp = test::call_service(&app, req).await;

  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "pendiente");
  assert!(body["error"].is_string());
  let order_id = order_id_of(&body);
  assert_eq!(ctx.order(order_id).await.status, tienda::models::OrderStatus::Pendiente);

  ctx.gateway.set_fail_preferences(false);
  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k1"), "mercadopago"))
    .to_request();
  let resp = test::call_service(&app, req).await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["replayed"], true);
  assert_eq!(order_id_of(&body), order_id);
  assert!(body["paymentInfo"]["redirectUrl"].is_string());
}

#[actix_rt::test]
#[serial]
async fn malformed_requests_answer_400_with_json_error() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(json!({"items": "nope"}))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert!(body["error"].is_string());

  // Well-formed but without any idempotency key.
  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(None, "whatsapp"))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
#[serial]
async fn webhook_marks_order_paid_and_refresh_shows_it() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k1"), "mercadopago"))
    .to_request();
  let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
  let order_id = order_id_of(&created);
  ctx.gateway.add_payment(payment("777", order_id, PaymentStatus::Approved));

  let req = test::TestRequest::post()
    .uri("/api/webhooks/mercadopago?type=payment&data.id=777")
    .set_json(json!({"type": "payment", "data": {"id": "777"}}))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let ack: Value = test::read_body_json(resp).await;
  assert_eq!(ack["transitioned"], true);

  // A redelivery is acknowledged but changes nothing.
  let req = test::TestRequest::post()
    .uri("/api/webhooks/mercadopago")
    .set_json(json!({"type": "payment", "data": {"id": "777"}}))
    .to_request();
  let ack: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(ack["transitioned"], false);

  let req = test::TestRequest::get()
    .uri(&format!("/api/orders/{}?refresh=true", order_id))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body["order"]["status"], "pagado");
  assert_eq!(body["order"]["paymentDetails"]["paymentId"], "777");
  assert_eq!(ctx.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 1);
}

#[actix_rt::test]
#[serial]
async fn non_payment_webhook_is_acknowledged() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);
  let req = test::TestRequest::post()
    .uri("/api/webhooks/mercadopago?topic=merchant_order&id=5")
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let ack: Value = test::read_body_json(resp).await;
  assert!(ack["ignored"].is_string());
}

#[actix_rt::test]
#[serial]
async fn resend_with_mail_down_still_answers_200() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k-wa"), "whatsapp"))
    .to_request();
  let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
  let order_id = order_id_of(&created);
  assert!(created["whatsappLink"].as_str().is_some_and(|l| l.starts_with("https://wa.me/")));

  let req = test::TestRequest::patch()
    .uri(&format!("/api/admin/orders/{}/status", order_id))
    .insert_header(("Authorization", format!("Bearer {}", ADMIN_TOKEN)))
    .set_json(json!({"status": "pagado"}))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);

  ctx.mailer.set_down(true);
  let req = test::TestRequest::post()
    .uri(&format!("/api/orders/{}/resend-confirmation", order_id))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["success"], false);
  assert!(body["error"].is_string());
}

#[actix_rt::test]
#[serial]
async fn admin_endpoint_requires_bearer_token() {
  let ctx = TestApp::new();
  let app = init_app!(ctx);
  let uri = format!("/api/admin/orders/{}/status", Uuid::new_v4());

  let req = test::TestRequest::patch().uri(&uri).set_json(json!({"status": "enviado"})).to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

  let req = test::TestRequest::patch()
    .uri(&uri)
    .insert_header(("Authorization", "Bearer wrong"))
    .set_json(json!({"status": "enviado"}))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

  let req = test::TestRequest::patch()
    .uri(&uri)
    .insert_header(("Authorization", format!("Bearer {}", ADMIN_TOKEN)))
    .set_json(json!({"status": "enviado"}))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
#[serial]
async fn recreate_and_whatsapp_link_endpoints() {
  let ctx = TestApp::new();
  ctx.gateway.set_fail_preferences(true);
  let app = init_app!(ctx);

  let req = test::TestRequest::post()
    .uri("/api/orders")
    .set_json(order_body(Some("k1"), "mercadopago"))
    .to_request();
  let failed: Value = test::read_body_json(test::call_service(&app, req).await).await;
  let order_id = order_id_of(&failed);

  ctx.gateway.set_fail_preferences(false);
  let req = test::TestRequest::post()
    .uri(&format!("/api/orders/{}/payment", order_id))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert!(body["paymentInfo"]["redirectUrl"].is_string());
  assert_eq!(body["status"], "pendiente");

  let req = test::TestRequest::get()
    .uri(&format!("/api/orders/{}/whatsapp-link", order_id))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert!(body["whatsappLink"].as_str().is_some_and(|l| l.contains("5491155550000")));

  let req = test::TestRequest::get()
    .uri(&format!("/api/orders/{}/whatsapp-link", Uuid::new_v4()))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
