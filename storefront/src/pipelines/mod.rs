// storefront/src/pipelines/mod.rs

//! Every workflow of the service as a `flow` pipeline, registered once at
//! startup and run per request through `AppState::flows`.

use crate::errors::AppError;
use flow::FlowRegistry;

pub mod common_steps;
pub mod contexts;
pub mod payment_arms;

pub mod admin_status_pipeline;
pub mod checkout_pipeline;
pub mod payment_notification_pipeline;
pub mod recreate_payment_pipeline;
pub mod resend_confirmation_pipeline;

pub fn register_all_pipelines(registry: &FlowRegistry<AppError>) {
  tracing::info!("Registering pipelines...");

  checkout_pipeline::register_checkout_pipeline(registry);
  payment_notification_pipeline::register_payment_notification_pipeline(registry);
  recreate_payment_pipeline::register_recreate_payment_pipeline(registry);
  resend_confirmation_pipeline::register_resend_confirmation_pipeline(registry);
  admin_status_pipeline::register_admin_status_pipeline(registry);

  tracing::info!("All pipelines registered.");
}
