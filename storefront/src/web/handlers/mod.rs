// storefront/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod orders_handlers;
pub mod webhook_handlers;
