// storefront/src/store/mod.rs

//! Persistence port for orders and its two adapters.
//!
//! Every mutation that races with another request (webhook retries, admin
//! clicks, recreate-payment) is a conditional update: it names the statuses it
//! expects and returns `None` when the order was no longer in one of them.

pub mod memory;
pub mod postgres;

use crate::models::{Order, OrderStatus, PaymentDetails, PreferenceLinks};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("order row {id} could not be decoded: {message}")]
  Corrupt { id: Uuid, message: String },
}

/// Result of inserting an order under its idempotency key.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
  Created(Order),
  /// The key was already taken; this is the order that owns it.
  Existing(Order),
}

impl InsertOutcome {
  pub fn order(&self) -> &Order {
    match self {
      InsertOutcome::Created(order) | InsertOutcome::Existing(order) => order,
    }
  }

  pub fn into_order(self) -> Order {
    match self {
      InsertOutcome::Created(order) | InsertOutcome::Existing(order) => order,
    }
  }

  pub fn is_replay(&self) -> bool {
    matches!(self, InsertOutcome::Existing(_))
  }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Inserts `order` unless its idempotency key already exists, in which case
  /// the stored order is returned untouched.
  async fn insert_or_get(&self, order: Order) -> Result<InsertOutcome, StoreError>;

  async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

  /// Stores a new payment preference and resets the status to `pendiente`,
  /// provided the order is currently in one of `expected`.
  async fn save_preference(
    &self,
    id: Uuid,
    links: &PreferenceLinks,
    expected: &[OrderStatus],
  ) -> Result<Option<Order>, StoreError>;

  /// Caches the gateway's view of a payment. Last writer wins.
  async fn record_payment(&self, id: Uuid, details: &PaymentDetails) -> Result<Option<Order>, StoreError>;

  /// Atomically moves the order to `pagado` if it is in one of `from`.
  /// `Some` only for the caller that performed the transition.
  async fn mark_paid_if(&self, id: Uuid, from: &[OrderStatus]) -> Result<Option<Order>, StoreError>;

  /// Moves the order from `expected` to `next`; `None` when it was not in `expected`.
  async fn update_status_if(
    &self,
    id: Uuid,
    expected: OrderStatus,
    next: OrderStatus,
  ) -> Result<Option<Order>, StoreError>;
}
