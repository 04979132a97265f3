// storefront/src/services/mod.rs

pub mod mailer;
pub mod mercadopago;
pub mod notifications;
pub mod signature;
pub mod whatsapp;
