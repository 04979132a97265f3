// storefront/src/store/memory.rs

use crate::models::{Order, OrderStatus, PaymentDetails, PreferenceLinks};
use crate::store::{InsertOutcome, OrderStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
  orders: HashMap<Uuid, Order>,
  by_key: HashMap<String, Uuid>,
}

/// Process-local order store. One mutex guards both maps, so every
/// conditional update is atomic with respect to the others.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
  inner: Arc<Mutex<Inner>>,
}

impl InMemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().orders.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn mutate_if(&self, id: Uuid, allowed: impl Fn(OrderStatus) -> bool, f: impl FnOnce(&mut Order)) -> Option<Order> {
    let mut inner = self.inner.lock();
    let order = inner.orders.get_mut(&id)?;
    if !allowed(order.status) {
      return None;
    }
    f(order);
    order.updated_at = Utc::now();
    Some(order.clone())
  }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
  async fn insert_or_get(&self, order: Order) -> Result<InsertOutcome, StoreError> {
    let mut inner = self.inner.lock();
    if let Some(existing) = inner.by_key.get(&order.idempotency_key).and_then(|id| inner.orders.get(id)) {
      return Ok(InsertOutcome::Existing(existing.clone()));
    }
    inner.by_key.insert(order.idempotency_key.clone(), order.id);
    inner.orders.insert(order.id, order.clone());
    Ok(InsertOutcome::Created(order))
  }

  async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
    Ok(self.inner.lock().orders.get(&id).cloned())
  }

  async fn save_preference(
    &self,
    id: Uuid,
    links: &PreferenceLinks,
    expected: &[OrderStatus],
  ) -> Result<Option<Order>, StoreError> {
    Ok(self.mutate_if(id, |s| expected.contains(&s), |order| order.apply_preference(links)))
  }

  async fn record_payment(&self, id: Uuid, details: &PaymentDetails) -> Result<Option<Order>, StoreError> {
    Ok(self.mutate_if(id, |_| true, |order| order.payment_details = Some(details.clone())))
  }

  async fn mark_paid_if(&self, id: Uuid, from: &[OrderStatus]) -> Result<Option<Order>, StoreError> {
    Ok(self.mutate_if(id, |s| from.contains(&s), |order| order.status = OrderStatus::Pagado))
  }

  async fn update_status_if(
    &self,
    id: Uuid,
    expected: OrderStatus,
    next: OrderStatus,
  ) -> Result<Option<Order>, StoreError> {
    Ok(self.mutate_if(id, |s| s == expected, |order| order.status = next))
  }
}
