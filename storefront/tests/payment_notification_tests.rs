// storefront/tests/payment_notification_tests.rs
mod common;

use common::*;
use flow::{ContextData, PipelineResult};
use hmac::{Hmac, Mac};
use serde_json::json;
use serial_test::serial;
use sha2::Sha256;
use std::collections::HashMap;
use tienda::errors::AppError;
use tienda::models::{OrderStatus, PaymentMethod, PaymentStatus};
use tienda::pipelines::contexts::{NotificationSource, PaymentNotificationCtxData};
use uuid::Uuid;

fn webhook(body: serde_json::Value) -> NotificationSource {
  NotificationSource::Webhook {
    body,
    query: HashMap::new(),
    signature: None,
    request_id: None,
  }
}

fn payment_webhook(payment_id: &str) -> NotificationSource {
  webhook(json!({"type": "payment", "action": "payment.updated", "data": {"id": payment_id}}))
}

async fn deliver(
  app: &TestApp,
  source: NotificationSource,
) -> Result<(PipelineResult, PaymentNotificationCtxData), AppError> {
  let ctx = ContextData::new(PaymentNotificationCtxData::new(app.state.clone(), source));
  let result = app.state.flows.run(ctx.clone()).await?;
  Ok((result, ctx.snapshot()))
}

async fn pending_mercadopago_order(app: &TestApp) -> Uuid {
  let ctx = app.checkout(checkout_request("k1", PaymentMethod::MercadoPago)).await.unwrap();
  ctx.order.unwrap().id
}

#[tokio::test]
#[serial]
async fn approved_payment_marks_order_paid_and_sends_both_emails_once() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9001", order_id, PaymentStatus::Approved));

  let (result, ctx) = deliver(&app, payment_webhook("9001")).await.unwrap();

  assert_eq!(result, PipelineResult::Completed);
  assert!(ctx.transitioned);
  assert_eq!(ctx.notifications.len(), 2);
  let order = app.order(order_id).await;
  assert_eq!(order.status, OrderStatus::Pagado);
  assert_eq!(order.payment_details.as_ref().map(|d| d.payment_id.as_str()), Some("9001"));
  assert_eq!(app.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 1);
  assert_eq!(app.mailer.count_subject(PAYMENT_ALERT_SUBJECT), 1);
}

#[tokio::test]
#[serial]
async fn duplicate_approval_sends_no_more_emails() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9001", order_id, PaymentStatus::Approved));

  deliver(&app, payment_webhook("9001")).await.unwrap();
  let sent_after_first = app.mailer.sent_count();
  let (_, second) = deliver(&app, payment_webhook("9001")).await.unwrap();

  assert!(!second.transitioned);
  assert!(second.notifications.is_empty());
  assert_eq!(app.mailer.sent_count(), sent_after_first);
  assert_eq!(app.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 1);
  assert_eq!(app.order(order_id).await.status, OrderStatus::Pagado);
}

#[tokio::test]
#[serial]
async fn concurrent_approvals_transition_exactly_once() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9001", order_id, PaymentStatus::Approved));

  let deliveries = (0..8).map(|_| deliver(&app, payment_webhook("9001")));
  let results = futures_util::future::join_all(deliveries).await;

  let transitions = results
    .into_iter()
    .map(|r| r.unwrap().1)
    .filter(|ctx| ctx.transitioned)
    .count();
  assert_eq!(transitions, 1);
  assert_eq!(app.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 1);
  assert_eq!(app.mailer.count_subject(PAYMENT_ALERT_SUBJECT), 1);
}

#[tokio::test]
#[serial]
async fn non_approved_payment_is_cached_without_transition() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9002", order_id, PaymentStatus::Rejected));

  let (_, ctx) = deliver(&app, payment_webhook("9002")).await.unwrap();

  assert!(!ctx.transitioned);
  let order = app.order(order_id).await;
  assert_eq!(order.status, OrderStatus::Pendiente);
  assert_eq!(order.payment_details.unwrap().status, PaymentStatus::Rejected);
  assert_eq!(app.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 0);
}

#[tokio::test]
#[serial]
async fn non_payment_topics_are_acknowledged_without_effect() {
  let app = TestApp::new();
  let (result, ctx) = deliver(&app, webhook(json!({"type": "merchant_order", "data": {"id": "1"}})))
    .await
    .unwrap();
  assert_eq!(result, PipelineResult::Stopped);
  assert!(ctx.ignored_reason.is_some());
  assert!(ctx.order.is_none());
}

#[tokio::test]
#[serial]
async fn query_string_notifications_are_processed() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9003", order_id, PaymentStatus::Approved));

  let source = NotificationSource::Webhook {
    body: serde_json::Value::Null,
    query: HashMap::from([
      ("topic".to_string(), "payment".to_string()),
      ("id".to_string(), "9003".to_string()),
    ]),
    signature: None,
    request_id: None,
  };
  let (_, ctx) = deliver(&app, source).await.unwrap();
  assert!(ctx.transitioned);
}

#[tokio::test]
#[serial]
async fn payment_for_unknown_order_is_ignored() {
  let app = TestApp::new();
  app.gateway.add_payment(payment("9004", Uuid::new_v4(), PaymentStatus::Approved));

  let (result, ctx) = deliver(&app, payment_webhook("9004")).await.unwrap();
  assert_eq!(result, PipelineResult::Stopped);
  assert!(ctx.ignored_reason.is_some());
  assert_eq!(app.mailer.sent_count(), 0);
}

#[tokio::test]
#[serial]
async fn payment_notification_without_id_is_rejected() {
  let app = TestApp::new();
  let err = deliver(&app, webhook(json!({"type": "payment"}))).await.unwrap_err();
  assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
#[serial]
async fn gateway_lookup_failure_surfaces_as_gateway_error() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("9005", order_id, PaymentStatus::Approved));
  app.gateway.fail_payment_lookups.store(true, std::sync::atomic::Ordering::SeqCst);

  let err = deliver(&app, payment_webhook("9005")).await.unwrap_err();
  assert!(matches!(err, AppError::Gateway { .. }));
  assert_eq!(app.order(order_id).await.status, OrderStatus::Pendiente);
}

#[tokio::test]
#[serial]
async fn approval_pays_whatsapp_pending_orders() {
  let app = TestApp::new();
  let wa = app.checkout(checkout_request("k-wa", PaymentMethod::WhatsApp)).await.unwrap();
  let wa_id = wa.order.unwrap().id;
  app.gateway.add_payment(payment("9006", wa_id, PaymentStatus::Approved));

  let (_, ctx) = deliver(&app, payment_webhook("9006")).await.unwrap();
  assert!(ctx.transitioned);
  assert_eq!(app.order(wa_id).await.status, OrderStatus::Pagado);
}

#[tokio::test]
#[serial]
async fn poll_refresh_uses_reference_search_then_cached_payment_id() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;

  let (result, ctx) = deliver(&app, NotificationSource::Poll { order_id }).await.unwrap();
  assert_eq!(result, PipelineResult::Stopped);
  assert!(ctx.ignored_reason.is_some());

  app.gateway.add_payment(payment("9007", order_id, PaymentStatus::Pending));
  let (_, ctx) = deliver(&app, NotificationSource::Poll { order_id }).await.unwrap();
  assert!(!ctx.transitioned);
  assert_eq!(app.order(order_id).await.payment_details.unwrap().payment_id, "9007");

  app.gateway.add_payment(payment("9007", order_id, PaymentStatus::Approved));
  let (_, ctx) = deliver(&app, NotificationSource::Poll { order_id }).await.unwrap();
  assert!(ctx.transitioned);
  assert_eq!(app.order(order_id).await.status, OrderStatus::Pagado);
}

#[tokio::test]
#[serial]
async fn poll_refresh_finds_newer_payment_after_a_rejected_one() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("p-old", order_id, PaymentStatus::Rejected));
  deliver(&app, payment_webhook("p-old")).await.unwrap();
  assert_eq!(app.order(order_id).await.payment_details.unwrap().payment_id, "p-old");

  // The customer paid again; that webhook never arrived.
  app.gateway.add_payment(payment("p-new", order_id, PaymentStatus::Approved));
  let (_, ctx) = deliver(&app, NotificationSource::Poll { order_id }).await.unwrap();

  assert!(ctx.transitioned);
  let order = app.order(order_id).await;
  assert_eq!(order.status, OrderStatus::Pagado);
  assert_eq!(order.payment_details.unwrap().payment_id, "p-new");
  assert_eq!(app.mailer.count_subject(PAYMENT_CONFIRMATION_SUBJECT), 1);
}

#[tokio::test]
#[serial]
async fn poll_refresh_keeps_an_approved_cached_payment() {
  let app = TestApp::new();
  let order_id = pending_mercadopago_order(&app).await;
  app.gateway.add_payment(payment("p-paid", order_id, PaymentStatus::Approved));
  deliver(&app, payment_webhook("p-paid")).await.unwrap();
  app.gateway.add_payment(payment("p-later", order_id, PaymentStatus::Rejected));

  let (_, ctx) = deliver(&app, NotificationSource::Poll { order_id }).await.unwrap();

  assert!(!ctx.transitioned);
  let order = app.order(order_id).await;
  assert_eq!(order.status, OrderStatus::Pagado);
  assert_eq!(order.payment_details.unwrap().payment_id, "p-paid");
}

mod signatures {
  use super::*;

  fn sign(manifest: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  fn signed_webhook(payment_id: &str, signature: Option<String>) -> NotificationSource {
    NotificationSource::Webhook {
      body: json!({"type": "payment", "data": {"id": payment_id}}),
      query: HashMap::from([("data.id".to_string(), payment_id.to_string())]),
      signature,
      request_id: Some("req-42".to_string()),
    }
  }

  #[tokio::test]
  #[serial]
  async fn valid_signature_is_accepted() {
    let app = TestApp::with_env(&[("MERCADOPAGO_WEBHOOK_SECRET", WEBHOOK_SECRET)]);
    let order_id = pending_mercadopago_order(&app).await;
    app.gateway.add_payment(payment("9101", order_id, PaymentStatus::Approved));

    let v1 = sign("id:9101;request-id:req-42;ts:1700000000;");
    let header = format!("ts=1700000000,v1={}", v1);
    let (_, ctx) = deliver(&app, signed_webhook("9101", Some(header))).await.unwrap();
    assert!(ctx.transitioned);
  }

  #[tokio::test]
  #[serial]
  async fn missing_or_forged_signature_is_rejected() {
    let app = TestApp::with_env(&[("MERCADOPAGO_WEBHOOK_SECRET", WEBHOOK_SECRET)]);
    let order_id = pending_mercadopago_order(&app).await;
    app.gateway.add_payment(payment("9102", order_id, PaymentStatus::Approved));

    let err = deliver(&app, signed_webhook("9102", None)).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));

    let forged = format!("ts=1700000000,v1={}", sign("id:other;request-id:req-42;ts:1700000000;"));
    let err = deliver(&app, signed_webhook("9102", Some(forged))).await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));

    assert_eq!(app.order(order_id).await.status, OrderStatus::Pendiente);
  }
}
