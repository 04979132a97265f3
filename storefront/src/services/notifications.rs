// storefront/src/services/notifications.rs

//! Transactional emails for the order lifecycle and their delivery with
//! bounded retry.

use crate::models::Order;
use crate::services::mailer::{MailError, Mailer, OutgoingEmail};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EmailTemplate {
  /// Customer: order received.
  OrderConfirmation,
  /// Admin: a new order came in.
  NewOrderAlert,
  /// Customer: payment approved.
  PaymentConfirmation,
  /// Admin: an order was paid and can be prepared for shipping.
  PaymentAlert,
}

impl EmailTemplate {
  pub fn is_admin(self) -> bool {
    matches!(self, EmailTemplate::NewOrderAlert | EmailTemplate::PaymentAlert)
  }
}

/// Outcome of one template send, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
  pub template: EmailTemplate,
  pub recipient: String,
  pub success: bool,
  pub message_id: Option<String>,
  pub error: Option<String>,
  pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  /// Delay before the second attempt; doubles after each further failure.
  pub base_backoff: Duration,
}

impl RetryPolicy {
  fn backoff_for(&self, failed_attempts: u32) -> Duration {
    self.base_backoff * 2u32.saturating_pow(failed_attempts.saturating_sub(1))
  }
}

pub struct Notifier {
  mailer: Arc<dyn Mailer>,
  admin_email: String,
  currency_id: String,
  retry: RetryPolicy,
}

impl Notifier {
  pub fn new(mailer: Arc<dyn Mailer>, admin_email: String, currency_id: String, retry: RetryPolicy) -> Self {
    Self {
      mailer,
      admin_email,
      currency_id,
      retry,
    }
  }

  pub fn render(&self, template: EmailTemplate, order: &Order) -> OutgoingEmail {
    let to = if template.is_admin() {
      self.admin_email.clone()
    } else {
      order.shipping_info.email.clone()
    };
    let (subject, lines) = template_content(template, order, &self.currency_id);
    OutgoingEmail {
      to,
      subject,
      html_body: render_html(&lines, order, &self.currency_id),
      text_body: render_text(&lines, order, &self.currency_id),
    }
  }

  /// Renders and sends `template`. Never fails: the report carries the outcome.
  #[instrument(name = "Notifier::send", skip(self, order), fields(order_id = %order.id))]
  pub async fn send(&self, template: EmailTemplate, order: &Order) -> DeliveryReport {
    let email = self.render(template, order);
    let mut attempts = 0;
    loop {
      attempts += 1;
      match self.mailer.send(&email).await {
        Ok(message_id) => {
          info!(attempts, message_id = %message_id, "Email delivered.");
          return DeliveryReport {
            template,
            recipient: email.to,
            success: true,
            message_id: Some(message_id),
            error: None,
            attempts,
          };
        }
        Err(e) if e.is_transient() && attempts < self.retry.max_attempts => {
          let backoff = self.retry.backoff_for(attempts);
          warn!(
            error = %e,
            attempt = attempts,
            max_attempts = self.retry.max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            "Email send failed; retrying."
          );
          tokio::time::sleep(backoff).await;
        }
        Err(e) => {
          log_give_up(&e, attempts);
          return DeliveryReport {
            template,
            recipient: email.to,
            success: false,
            message_id: None,
            error: Some(e.to_string()),
            attempts,
          };
        }
      }
    }
  }

  /// Sends the customer and admin templates for one event concurrently.
  pub async fn send_pair(&self, customer: EmailTemplate, admin: EmailTemplate, order: &Order) -> Vec<DeliveryReport> {
    let (c, a) = futures_util::future::join(self.send(customer, order), self.send(admin, order)).await;
    vec![c, a]
  }
}

fn log_give_up(err: &MailError, attempts: u32) {
  match err {
    MailError::Permanent(_) => error!(error = %err, attempts, "Email rejected permanently; not retrying."),
    MailError::Transient(_) => error!(error = %err, attempts, "Email retries exhausted."),
  }
}

fn money(amount: rust_decimal::Decimal, currency_id: &str) -> String {
  format!("{} {:.2}", currency_id, amount)
}

fn short_id(order: &Order) -> String {
  order.id.simple().to_string()[..8].to_uppercase()
}

fn template_content(template: EmailTemplate, order: &Order, currency_id: &str) -> (String, Vec<String>) {
  let short = short_id(order);
  let total = money(order.total_amount, currency_id);
  let customer = &order.shipping_info.name;
  match template {
    EmailTemplate::OrderConfirmation => (
      format!("Recibimos tu pedido #{}", short),
      vec![
        format!("Hola {}, gracias por tu compra.", customer),
        format!("Tu pedido #{} por {} quedó registrado.", short, total),
        match order.payment_method {
          crate::models::PaymentMethod::MercadoPago => {
            "Cuando MercadoPago confirme el pago te avisaremos por este medio.".to_string()
          }
          crate::models::PaymentMethod::WhatsApp => {
            "Te contactaremos por WhatsApp para coordinar el pago.".to_string()
          }
        },
      ],
    ),
    EmailTemplate::NewOrderAlert => (
      format!("Nuevo pedido #{} ({})", short, order.payment_method),
      vec![
        format!("Cliente: {} <{}> tel. {}", customer, order.shipping_info.email, order.shipping_info.phone),
        format!("Total: {} · Medio de pago: {} · Estado: {}", total, order.payment_method, order.status),
        format!("Pedido: {}", order.id),
      ],
    ),
    EmailTemplate::PaymentConfirmation => {
      let mut lines = vec![
        format!("Hola {}, confirmamos el pago de tu pedido #{}.", customer, short),
        format!("Total abonado: {}", total),
      ];
      if let Some(details) = &order.payment_details {
        lines.push(format!("Operación MercadoPago: {}", details.payment_id));
        if let Some(approved_at) = details.approved_at {
          lines.push(format!("Fecha de aprobación: {}", approved_at.format("%d/%m/%Y %H:%M UTC")));
        }
      }
      lines.push("Te avisaremos cuando el pedido sea despachado.".to_string());
      (format!("Pago confirmado - pedido #{}", short), lines)
    }
    EmailTemplate::PaymentAlert => {
      let mut lines = vec![
        format!("El pedido {} fue pagado ({}).", order.id, total),
        format!("Cliente: {} <{}> tel. {}", customer, order.shipping_info.email, order.shipping_info.phone),
        format!("Envío a: {}", order.shipping_info.full_address()),
      ];
      if let Some(details) = &order.payment_details {
        lines.push(format!(
          "Pago {} · medio {} · estado {:?}",
          details.payment_id,
          details.payment_method_id.as_deref().unwrap_or("-"),
          details.status
        ));
      }
      (format!("Pedido #{} pagado: preparar envío", short), lines)
    }
  }
}

fn items_rows(order: &Order, currency_id: &str) -> Vec<(String, String)> {
  order
    .items
    .iter()
    .map(|item| {
      (
        format!("{} x{}", item.title, item.quantity),
        money(item.subtotal(), currency_id),
      )
    })
    .collect()
}

fn escape_html(raw: &str) -> String {
  raw
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

fn render_text(lines: &[String], order: &Order, currency_id: &str) -> String {
  let mut out = lines.join("\n");
  out.push_str("\n\n");
  for (label, amount) in items_rows(order, currency_id) {
    out.push_str(&format!("- {}: {}\n", label, amount));
  }
  out.push_str(&format!("Total: {}\n", money(order.total_amount, currency_id)));
  out
}

fn render_html(lines: &[String], order: &Order, currency_id: &str) -> String {
  let paragraphs: String = lines
    .iter()
    .map(|l| format!("<p>{}</p>", escape_html(l)))
    .collect();
  let rows: String = items_rows(order, currency_id)
    .into_iter()
    .map(|(label, amount)| format!("<tr><td>{}</td><td style=\"text-align:right\">{}</td></tr>", escape_html(&label), amount))
    .collect();
  format!(
    r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
{}
<table style="width: 100%; border-collapse: collapse;">
{}
<tr><td><strong>Total</strong></td><td style="text-align:right"><strong>{}</strong></td></tr>
</table>
</body>
</html>"#,
    paragraphs,
    rows,
    money(order.total_amount, currency_id)
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{LineItem, PaymentMethod, ShippingInfo};
  use async_trait::async_trait;
  use parking_lot::Mutex;
  use rust_decimal::Decimal;

  struct ScriptedMailer {
    outcomes: Mutex<Vec<Result<String, MailError>>>,
    calls: Mutex<u32>,
  }

  impl ScriptedMailer {
    fn new(mut outcomes: Vec<Result<String, MailError>>) -> Self {
      outcomes.reverse();
      Self {
        outcomes: Mutex::new(outcomes),
        calls: Mutex::new(0),
      }
    }
  }

  #[async_trait]
  impl Mailer for ScriptedMailer {
    async fn send(&self, _email: &OutgoingEmail) -> Result<String, MailError> {
      *self.calls.lock() += 1;
      self
        .outcomes
        .lock()
        .pop()
        .unwrap_or_else(|| Err(MailError::Transient("script exhausted".into())))
    }
  }

  fn order() -> Order {
    Order::place(
      vec![LineItem {
        product_id: "p1".into(),
        title: "Yerba <1kg>".into(),
        quantity: 2,
        price: Decimal::new(1000, 2),
        image: None,
      }],
      ShippingInfo {
        name: "Ana".into(),
        email: "ana@example.com".into(),
        phone: "1155550000".into(),
        address: "Calle 1".into(),
        city: "CABA".into(),
        postal_code: "1000".into(),
      },
      PaymentMethod::MercadoPago,
      "k".into(),
      None,
    )
  }

  fn notifier(mailer: Arc<ScriptedMailer>, max_attempts: u32) -> Notifier {
    Notifier::new(
      mailer,
      "admin@tienda.test".into(),
      "ARS".into(),
      RetryPolicy {
        max_attempts,
        base_backoff: Duration::from_millis(0),
      },
    )
  }

  #[test]
  fn templates_go_to_the_right_recipient() {
    let n = notifier(Arc::new(ScriptedMailer::new(vec![])), 3);
    let o = order();
    assert_eq!(n.render(EmailTemplate::OrderConfirmation, &o).to, "ana@example.com");
    assert_eq!(n.render(EmailTemplate::PaymentConfirmation, &o).to, "ana@example.com");
    assert_eq!(n.render(EmailTemplate::NewOrderAlert, &o).to, "admin@tienda.test");
    assert_eq!(n.render(EmailTemplate::PaymentAlert, &o).to, "admin@tienda.test");
  }

  #[test]
  fn rendered_bodies_carry_total_and_escape_html() {
    let n = notifier(Arc::new(ScriptedMailer::new(vec![])), 3);
    let email = n.render(EmailTemplate::PaymentAlert, &order());
    assert!(email.text_body.contains("ARS 20.00"));
    assert!(email.text_body.contains("Calle 1, CABA (1000)"));
    assert!(email.html_body.contains("Yerba &lt;1kg&gt;"));
    assert!(!email.html_body.contains("<1kg>"));
  }

  #[tokio::test]
  async fn transient_failures_are_retried_up_to_the_limit() {
    let mailer = Arc::new(ScriptedMailer::new(vec![
      Err(MailError::Transient("timeout".into())),
      Err(MailError::Transient("timeout".into())),
      Ok("mid-1".into()),
    ]));
    let report = notifier(mailer.clone(), 3).send(EmailTemplate::OrderConfirmation, &order()).await;
    assert!(report.success);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.message_id.as_deref(), Some("mid-1"));

    let mailer = Arc::new(ScriptedMailer::new(vec![]));
    let report = notifier(mailer.clone(), 3).send(EmailTemplate::OrderConfirmation, &order()).await;
    assert!(!report.success);
    assert_eq!(report.attempts, 3);
    assert_eq!(*mailer.calls.lock(), 3);
  }

  #[tokio::test]
  async fn permanent_failures_are_not_retried() {
    let mailer = Arc::new(ScriptedMailer::new(vec![Err(MailError::Permanent("bad address".into()))]));
    let report = notifier(mailer.clone(), 3).send(EmailTemplate::PaymentConfirmation, &order()).await;
    assert!(!report.success);
    assert_eq!(report.attempts, 1);
    assert!(report.error.unwrap().contains("bad address"));
  }

  #[test]
  fn backoff_doubles() {
    let policy = RetryPolicy {
      max_attempts: 3,
      base_backoff: Duration::from_millis(100),
    };
    assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
  }
}
