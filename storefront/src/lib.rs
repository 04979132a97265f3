// storefront/src/lib.rs

//! Storefront checkout backend: orders, MercadoPago / WhatsApp payments and
//! transactional email, each workflow run as a `flow` pipeline.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;
