//! Storage seams used by the checkout services.
//!
//! The services only see these traits; Postgres implementations live in
//! `catalog_repository` and `order_repository`, and tests substitute
//! in-memory doubles.

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::models::catalog::Product;
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderStatus, OrderWithItems};

/// Read-only access to authoritative product data.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Fetch the products with the given ids in one round trip, including
    /// sizes and modifier groups. Unknown ids are simply absent from the
    /// result.
    async fn fetch_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, DatabaseError>;
}

/// Outcome of an insert guarded by the `payment_intent_id` unique constraint.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Order),
    /// Another writer already holds the payment id.
    Conflict,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Insert the order unless one already exists for its payment id.
    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, DatabaseError>;

    async fn insert_items(
        &self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<u64, DatabaseError>;

    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, DatabaseError>;

    /// Move an order to `next` only if its current status allows it.
    async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<Order, DatabaseError>;
}
