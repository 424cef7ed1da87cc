use crate::database::error::DatabaseError;
use crate::database::repository::CatalogReader;
use crate::models::catalog::{Modifier, ModifierGroup, Product, ProductSize, ProductType};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    product_type: String,
    base_price: Decimal,
    is_active: bool,
    in_stock: bool,
}

#[derive(Debug, Clone, FromRow)]
struct SizeRow {
    product_id: Uuid,
    name: String,
    price: Decimal,
}

#[derive(Debug, Clone, FromRow)]
struct ModifierRow {
    product_id: Uuid,
    group_id: Uuid,
    group_name: String,
    name: Option<String>,
    price: Option<Decimal>,
    is_available: Option<bool>,
}

/// Postgres-backed product price oracle
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_products(&self, ids: &[Uuid]) -> Result<Vec<ProductRow>, DatabaseError> {
        sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, product_type, base_price, is_active, in_stock
             FROM products
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn load_sizes(&self, ids: &[Uuid]) -> Result<Vec<SizeRow>, DatabaseError> {
        sqlx::query_as::<_, SizeRow>(
            "SELECT product_id, name, price
             FROM product_sizes
             WHERE product_id = ANY($1)
             ORDER BY product_id, display_order, name",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn load_modifiers(&self, ids: &[Uuid]) -> Result<Vec<ModifierRow>, DatabaseError> {
        sqlx::query_as::<_, ModifierRow>(
            "SELECT g.product_id, g.id AS group_id, g.name AS group_name,
                    m.name, m.price, m.is_available
             FROM modifier_groups g
             LEFT JOIN modifiers m ON m.group_id = g.id
             WHERE g.product_id = ANY($1)
             ORDER BY g.product_id, g.display_order, g.id, m.display_order, m.name",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[async_trait]
impl CatalogReader for CatalogRepository {
    async fn fetch_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (products, sizes, modifiers) = tokio::try_join!(
            self.load_products(ids),
            self.load_sizes(ids),
            self.load_modifiers(ids),
        )?;

        assemble(products, sizes, modifiers)
    }
}

/// Stitch the three result sets together, keeping the query ordering.
fn assemble(
    products: Vec<ProductRow>,
    sizes: Vec<SizeRow>,
    modifiers: Vec<ModifierRow>,
) -> Result<Vec<Product>, DatabaseError> {
    let mut sizes_by_product: HashMap<Uuid, Vec<ProductSize>> = HashMap::new();
    for row in sizes {
        sizes_by_product
            .entry(row.product_id)
            .or_default()
            .push(ProductSize {
                name: row.name,
                price: row.price,
            });
    }

    let mut groups_by_product: HashMap<Uuid, Vec<(Uuid, ModifierGroup)>> = HashMap::new();
    for row in modifiers {
        let groups = groups_by_product.entry(row.product_id).or_default();
        let needs_new_group = groups
            .last()
            .map(|(group_id, _)| *group_id != row.group_id)
            .unwrap_or(true);
        if needs_new_group {
            groups.push((
                row.group_id,
                ModifierGroup {
                    name: row.group_name.clone(),
                    modifiers: Vec::new(),
                },
            ));
        }

        // LEFT JOIN yields one null row for an empty group
        if let (Some(name), Some(price)) = (row.name, row.price) {
            if let Some((_, group)) = groups.last_mut() {
                group.modifiers.push(Modifier {
                    name,
                    price,
                    is_available: row.is_available.unwrap_or(false),
                });
            }
        }
    }

    products
        .into_iter()
        .map(|row| {
            let product_type = ProductType::from_str(&row.product_type)
                .map_err(DatabaseError::decode)?;
            Ok(Product {
                id: row.id,
                name: row.name,
                product_type,
                base_price: row.base_price,
                is_active: row.is_active,
                in_stock: row.in_stock,
                sizes: sizes_by_product.remove(&row.id).unwrap_or_default(),
                modifier_groups: groups_by_product
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, group)| group)
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product_row(id: Uuid, product_type: &str) -> ProductRow {
        ProductRow {
            id,
            name: "Latte".to_string(),
            product_type: product_type.to_string(),
            base_price: dec!(4.00),
            is_active: true,
            in_stock: true,
        }
    }

    #[test]
    fn test_assemble_groups_sizes_and_modifiers() {
        let id = Uuid::new_v4();
        let group = Uuid::new_v4();
        let empty_group = Uuid::new_v4();

        let products = assemble(
            vec![product_row(id, "drink")],
            vec![
                SizeRow {
                    product_id: id,
                    name: "Regular".to_string(),
                    price: dec!(4.50),
                },
                SizeRow {
                    product_id: id,
                    name: "Large".to_string(),
                    price: dec!(5.25),
                },
            ],
            vec![
                ModifierRow {
                    product_id: id,
                    group_id: group,
                    group_name: "Milk".to_string(),
                    name: Some("Oat Milk".to_string()),
                    price: Some(dec!(0.75)),
                    is_available: Some(true),
                },
                ModifierRow {
                    product_id: id,
                    group_id: group,
                    group_name: "Milk".to_string(),
                    name: Some("Almond Milk".to_string()),
                    price: Some(dec!(0.75)),
                    is_available: Some(false),
                },
                ModifierRow {
                    product_id: id,
                    group_id: empty_group,
                    group_name: "Syrups".to_string(),
                    name: None,
                    price: None,
                    is_available: None,
                },
            ],
        )
        .unwrap();

        assert_eq!(products.len(), 1);
        let product = &products[0];
        assert_eq!(product.sizes.len(), 2);
        assert_eq!(product.sizes[0].name, "Regular");
        assert_eq!(product.modifier_groups.len(), 2);
        assert_eq!(product.modifier_groups[0].modifiers.len(), 2);
        assert!(!product.modifier_groups[0].modifiers[1].is_available);
        assert!(product.modifier_groups[1].modifiers.is_empty());
    }

    #[test]
    fn test_assemble_rejects_unknown_product_type() {
        let result = assemble(vec![product_row(Uuid::new_v4(), "vinyl")], vec![], vec![]);
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_fetch_products_against_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let pool = PgPool::connect(&url).await.unwrap();
        let repo = CatalogRepository::new(pool);
        let products = repo.fetch_products(&[Uuid::new_v4()]).await.unwrap();
        assert!(products.is_empty());
    }
}
