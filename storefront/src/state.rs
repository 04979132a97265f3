// storefront/src/state.rs

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::mailer::Mailer;
use crate::services::mercadopago::PaymentGateway;
use crate::services::notifications::{Notifier, RetryPolicy};
use crate::store::OrderStore;
use flow::FlowRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn OrderStore>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub notifier: Arc<Notifier>,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the services together and registers every pipeline.
  pub fn new(
    config: Arc<AppConfig>,
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
  ) -> Self {
    let notifier = Notifier::new(
      mailer,
      config.email.admin_email.clone(),
      config.mercadopago.currency_id.clone(),
      RetryPolicy {
        max_attempts: config.email.max_attempts,
        base_backoff: config.email.retry_backoff,
      },
    );
    let state = Self {
      store,
      gateway,
      notifier: Arc::new(notifier),
      flows: Arc::new(FlowRegistry::new()),
      config,
    };
    crate::pipelines::register_all_pipelines(&state.flows);
    state
  }
}
