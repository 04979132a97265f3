// storefront/src/models/mod.rs

//! Order documents and the payment data cached on them.

pub mod order;
pub mod payment;

pub use order::{compute_total, LineItem, Order, OrderStatus, PaymentMethod, ShippingInfo};
pub use payment::{PaymentDetails, PaymentStatus, PreferenceLinks};
