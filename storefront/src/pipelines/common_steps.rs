// storefront/src/pipelines/common_steps.rs

//! Helpers shared by several pipelines.

use crate::errors::{AppError, Result};
use crate::models::Order;
use crate::services::notifications::{DeliveryReport, EmailTemplate};
use crate::state::AppState;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub async fn load_order(state: &AppState, order_id: Uuid) -> Result<Order> {
  state
    .store
    .get(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
}

/// Payment confirmation to the customer and payment alert to the admin.
#[instrument(name = "common_step::notify_payment_confirmed", skip_all, fields(order_id = %order.id))]
pub async fn notify_payment_confirmed(state: &AppState, order: &Order) -> Vec<DeliveryReport> {
  let reports = state
    .notifier
    .send_pair(EmailTemplate::PaymentConfirmation, EmailTemplate::PaymentAlert, order)
    .await;
  log_reports(&reports);
  reports
}

/// Order confirmation to the customer and new-order alert to the admin.
#[instrument(name = "common_step::notify_order_created", skip_all, fields(order_id = %order.id))]
pub async fn notify_order_created(state: &AppState, order: &Order) -> Vec<DeliveryReport> {
  let reports = state
    .notifier
    .send_pair(EmailTemplate::OrderConfirmation, EmailTemplate::NewOrderAlert, order)
    .await;
  log_reports(&reports);
  reports
}

fn log_reports(reports: &[DeliveryReport]) {
  for report in reports {
    if report.success {
      info!(template = ?report.template, attempts = report.attempts, "Notification sent.");
    } else {
      warn!(
        template = ?report.template,
        attempts = report.attempts,
        error = report.error.as_deref().unwrap_or("unknown"),
        "Notification could not be delivered."
      );
    }
  }
}
