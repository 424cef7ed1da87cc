use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{InsertOutcome, OrderStore};
use crate::models::order::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderSource, OrderStatus, OrderWithItems,
    PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, order_number, customer_name, customer_email, customer_phone, \
     subtotal, tax, total, status, payment_status, payment_intent_id, special_instructions, \
     source, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    status: String,
    payment_status: String,
    payment_intent_id: String,
    special_instructions: Option<String>,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            subtotal: row.subtotal,
            tax: row.tax,
            total: row.total,
            status: OrderStatus::from_str(&row.status).map_err(DatabaseError::decode)?,
            payment_status: PaymentStatus::from_str(&row.payment_status)
                .map_err(DatabaseError::decode)?,
            payment_intent_id: row.payment_intent_id,
            special_instructions: row.special_instructions,
            source: OrderSource::from_str(&row.source).map_err(DatabaseError::decode)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<String>,
    product_name: String,
    size_name: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    modifiers: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            size_name: row.size_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            modifiers: row.modifiers,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed order store
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(Order::try_from).transpose()
    }

    async fn items_for(&self, order_id: Uuid) -> Result<Vec<OrderItem>, DatabaseError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, product_name, size_name, quantity, unit_price,
                    modifiers, created_at
             FROM order_items
             WHERE order_id = $1
             ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE payment_intent_id = $1",
            ORDER_COLUMNS
        ))
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(Order::try_from).transpose()
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (order_number, customer_name, customer_email, customer_phone,
                                 subtotal, tax, total, status, payment_status,
                                 payment_intent_id, special_instructions, source)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (payment_intent_id) DO NOTHING
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(order.subtotal)
        .bind(order.tax)
        .bind(order.total)
        .bind(OrderStatus::Pending.as_str())
        .bind(PaymentStatus::Paid.as_str())
        .bind(&order.payment_intent_id)
        .bind(&order.special_instructions)
        .bind(order.source.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(Order::try_from(row)?)),
            None => Ok(InsertOutcome::Conflict),
        }
    }

    async fn insert_items(
        &self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<u64, DatabaseError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let mut inserted = 0u64;

        for item in items {
            let result = sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, size_name,
                                          quantity, unit_price, modifiers)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order_id)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(&item.size_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&item.modifiers)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(inserted)
    }

    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, DatabaseError> {
        // order_number is derived from the payment id suffix; newest wins on collision
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE order_number = $1 ORDER BY created_at DESC LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = Order::try_from(row)?;
        let items = self.items_for(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<Order, DatabaseError> {
        let allowed: Vec<String> = OrderStatus::predecessors(next)
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = ANY($3)
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(next.as_str())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if let Some(row) = row {
            return Order::try_from(row);
        }

        match self.find_by_id(order_id).await? {
            Some(current) => Err(DatabaseError::new(DatabaseErrorKind::InvalidTransition {
                from: current.status.to_string(),
                to: next.to_string(),
            })),
            None => Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            })),
        }
    }
}
