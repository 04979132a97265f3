// storefront/src/store/postgres.rs

use crate::models::{LineItem, Order, OrderStatus, PaymentDetails, PaymentMethod, PreferenceLinks, ShippingInfo};
use crate::store::{InsertOutcome, OrderStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::instrument;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, items, total_amount, shipping_info, payment_method, status, idempotency_key, \
   user_id, preference_id, init_point, sandbox_init_point, redirect_url, payment_attempts, payment_details, \
   created_at, updated_at";

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  items: Json<Vec<LineItem>>,
  total_amount: Decimal,
  shipping_info: Json<ShippingInfo>,
  payment_method: String,
  status: String,
  idempotency_key: String,
  user_id: Option<String>,
  preference_id: Option<String>,
  init_point: Option<String>,
  sandbox_init_point: Option<String>,
  redirect_url: Option<String>,
  payment_attempts: i32,
  payment_details: Option<Json<PaymentDetails>>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = StoreError;

  fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
    let corrupt = |message: String| StoreError::Corrupt { id: row.id, message };
    Ok(Order {
      id: row.id,
      items: row.items.0,
      total_amount: row.total_amount,
      shipping_info: row.shipping_info.0,
      payment_method: row.payment_method.parse::<PaymentMethod>().map_err(corrupt)?,
      status: row.status.parse::<OrderStatus>().map_err(corrupt)?,
      idempotency_key: row.idempotency_key,
      user_id: row.user_id,
      preference_id: row.preference_id,
      init_point: row.init_point,
      sandbox_init_point: row.sandbox_init_point,
      redirect_url: row.redirect_url,
      payment_attempts: u32::try_from(row.payment_attempts).map_err(|e| corrupt(e.to_string()))?,
      payment_details: row.payment_details.map(|d| d.0),
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
  statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn into_order(row: Option<OrderRow>) -> Result<Option<Order>, StoreError> {
  row.map(Order::try_from).transpose()
}

/// Orders persisted in PostgreSQL. Conditional updates are single
/// `UPDATE ... WHERE status = ANY(..) RETURNING` statements.
#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
    let pool = PgPool::connect(database_url).await?;
    Ok(Self::new(pool))
  }

  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "PgOrderStore::insert_or_get", skip_all, fields(order_id = %order.id), err)]
  async fn insert_or_get(&self, order: Order) -> Result<InsertOutcome, StoreError> {
    let inserted: Option<OrderRow> = sqlx::query_as(&format!(
      "INSERT INTO orders (id, items, total_amount, shipping_info, payment_method, status, idempotency_key, \
         user_id, payment_attempts, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
       ON CONFLICT (idempotency_key) DO NOTHING \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(Json(&order.items))
    .bind(order.total_amount)
    .bind(Json(&order.shipping_info))
    .bind(order.payment_method.as_str())
    .bind(order.status.as_str())
    .bind(&order.idempotency_key)
    .bind(&order.user_id)
    .bind(order.payment_attempts as i32)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_optional(&self.pool)
    .await?;

    if let Some(row) = inserted {
      return Ok(InsertOutcome::Created(Order::try_from(row)?));
    }

    let existing: OrderRow = sqlx::query_as(&format!("SELECT {} FROM orders WHERE idempotency_key = $1", ORDER_COLUMNS))
      .bind(&order.idempotency_key)
      .fetch_one(&self.pool)
      .await?;
    Ok(InsertOutcome::Existing(Order::try_from(existing)?))
  }

  async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    into_order(row)
  }

  #[instrument(name = "PgOrderStore::save_preference", skip(self, links, expected), err)]
  async fn save_preference(
    &self,
    id: Uuid,
    links: &PreferenceLinks,
    expected: &[OrderStatus],
  ) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET preference_id = $2, init_point = $3, sandbox_init_point = $4, redirect_url = $5, \
         payment_attempts = payment_attempts + 1, status = 'pendiente', updated_at = now() \
       WHERE id = $1 AND status = ANY($6) \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(id)
    .bind(&links.preference_id)
    .bind(&links.init_point)
    .bind(&links.sandbox_init_point)
    .bind(&links.redirect_url)
    .bind(status_names(expected))
    .fetch_optional(&self.pool)
    .await?;
    into_order(row)
  }

  async fn record_payment(&self, id: Uuid, details: &PaymentDetails) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET payment_details = $2, updated_at = now() WHERE id = $1 RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(id)
    .bind(Json(details))
    .fetch_optional(&self.pool)
    .await?;
    into_order(row)
  }

  #[instrument(name = "PgOrderStore::mark_paid_if", skip(self, from), err)]
  async fn mark_paid_if(&self, id: Uuid, from: &[OrderStatus]) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET status = 'pagado', updated_at = now() WHERE id = $1 AND status = ANY($2) RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(id)
    .bind(status_names(from))
    .fetch_optional(&self.pool)
    .await?;
    into_order(row)
  }

  async fn update_status_if(
    &self,
    id: Uuid,
    expected: OrderStatus,
    next: OrderStatus,
  ) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET status = $3, updated_at = now() WHERE id = $1 AND status = $2 RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(id)
    .bind(expected.as_str())
    .bind(next.as_str())
    .fetch_optional(&self.pool)
    .await?;
    into_order(row)
  }
}
