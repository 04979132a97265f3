// storefront/src/services/whatsapp.rs

use crate::models::Order;

/// `https://wa.me/<digits>?text=<message>` prefilled with the order id, its
/// status and its total.
pub fn whatsapp_link(number: &str, order: &Order, currency_id: &str) -> String {
  let digits: String = number.chars().filter(char::is_ascii_digit).collect();
  let message = format!(
    "Hola! Quiero coordinar el pago de mi pedido {}. Estado: {}. Total: {} {:.2}",
    order.id, order.status, currency_id, order.total_amount
  );
  format!("https://wa.me/{}?text={}", digits, urlencoding::encode(&message))
}
