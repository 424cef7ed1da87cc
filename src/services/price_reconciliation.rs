//! Server-side repricing of a validated cart against the catalog.
//!
//! Client prices are only compared, never used: every verified line carries
//! the catalog price, and any deviation beyond the configured tolerance
//! aborts the checkout before a payment authorization exists.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::database::repository::CatalogReader;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::models::cart::{PricedModifier, ValidatedCartItem, VerifiedItem};
use crate::models::catalog::Product;
use crate::payments::utils::round_cents;
use crate::services::platform_fee::FeeSchedule;

const FALLBACK_SIZES: [&str; 2] = ["standard", "regular"];

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A product with its sizes and available modifiers keyed by normalized name.
#[derive(Debug, Clone)]
struct PricedProduct {
    product: Product,
    sizes: HashMap<String, (String, Decimal)>,
    modifiers: HashMap<String, PricedModifier>,
}

impl PricedProduct {
    fn new(product: Product) -> Self {
        let mut sizes = HashMap::new();
        for size in &product.sizes {
            sizes
                .entry(normalize(&size.name))
                .or_insert_with(|| (size.name.clone(), size.price));
        }

        let mut modifiers = HashMap::new();
        for modifier in product
            .modifier_groups
            .iter()
            .flat_map(|group| group.modifiers.iter())
            .filter(|modifier| modifier.is_available)
        {
            modifiers
                .entry(normalize(&modifier.name))
                .or_insert_with(|| PricedModifier {
                    name: modifier.name.clone(),
                    price: modifier.price,
                });
        }

        Self {
            product,
            sizes,
            modifiers,
        }
    }

    /// Requested size, else "standard", else "regular", else the base price.
    fn resolve_size(&self, requested: Option<&str>) -> (Option<String>, Decimal) {
        let candidates = requested
            .map(normalize)
            .into_iter()
            .chain(FALLBACK_SIZES.iter().map(|name| name.to_string()));

        for key in candidates {
            if let Some((name, price)) = self.sizes.get(&key) {
                return (Some(name.clone()), *price);
            }
        }

        (None, self.product.base_price)
    }
}

/// Catalog lookups for one request, built once.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    products: HashMap<Uuid, PricedProduct>,
}

impl PricingTable {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|product| (product.id, PricedProduct::new(product)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Result of repricing a cart.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub subtotal: Decimal,
    /// Rounded to cents
    pub platform_fee: Decimal,
    pub items: Vec<VerifiedItem>,
}

fn domain(err: DomainError) -> AppError {
    AppError::new(AppErrorKind::Domain(err))
}

/// Price validated lines against `table`. Pure; the first failing line aborts.
pub fn price_items(
    table: &PricingTable,
    items: &[ValidatedCartItem],
    fees: &FeeSchedule,
    tolerance: Decimal,
) -> AppResult<Reconciliation> {
    let mut subtotal = Decimal::ZERO;
    let mut platform_fee = Decimal::ZERO;
    let mut verified = Vec::with_capacity(items.len());

    for item in items {
        let priced = Uuid::parse_str(&item.product_ref)
            .ok()
            .and_then(|id| table.products.get(&id))
            .ok_or_else(|| {
                domain(DomainError::ProductNotFound {
                    product_id: item.product_ref.clone(),
                })
            })?;
        let product = &priced.product;

        if !product.is_purchasable() {
            return Err(domain(DomainError::ProductUnavailable {
                product_name: product.name.clone(),
            }));
        }

        let (size_name, size_price) = priced.resolve_size(item.size_name.as_deref());

        let modifiers = item
            .modifier_names
            .iter()
            .map(|requested| {
                priced.modifiers.get(&normalize(requested)).cloned().ok_or_else(|| {
                    domain(DomainError::ModifierUnavailable {
                        product_name: product.name.clone(),
                        modifier: requested.clone(),
                    })
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let unit_price = size_price + modifiers.iter().map(|m| m.price).sum::<Decimal>();

        if (unit_price - item.client_unit_price).abs() > tolerance {
            warn!(
                product_id = %product.id,
                expected = %unit_price,
                received = %item.client_unit_price,
                "client price deviates from catalog"
            );
            return Err(domain(DomainError::PriceMismatch {
                product_name: product.name.clone(),
                expected: unit_price,
                received: item.client_unit_price,
            }));
        }

        let line = VerifiedItem {
            product_id: product.id,
            product_name: product.name.clone(),
            product_type: product.product_type,
            size_name,
            unit_price,
            quantity: item.quantity,
            modifiers,
        };

        let line_total = line.line_total();
        subtotal += line_total;
        platform_fee += line_total * fees.rate_for(product.product_type);
        verified.push(line);
    }

    Ok(Reconciliation {
        subtotal,
        platform_fee: round_cents(platform_fee),
        items: verified,
    })
}

/// Reprices carts using the catalog as the only source of truth.
#[derive(Clone)]
pub struct PriceReconciler {
    catalog: Arc<dyn CatalogReader>,
    fees: FeeSchedule,
    tolerance: Decimal,
}

impl PriceReconciler {
    pub fn new(catalog: Arc<dyn CatalogReader>, fees: FeeSchedule, tolerance: Decimal) -> Self {
        Self {
            catalog,
            fees,
            tolerance,
        }
    }

    /// Fetch every referenced product in one batch and price the cart.
    pub async fn reconcile(&self, items: &[ValidatedCartItem]) -> AppResult<Reconciliation> {
        let ids: Vec<Uuid> = items
            .iter()
            .filter_map(|item| Uuid::parse_str(&item.product_ref).ok())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let products = if ids.is_empty() {
            Vec::new()
        } else {
            self.catalog.fetch_products(&ids).await.map_err(|e| {
                error!(error = %e, "catalog lookup failed");
                AppError::upstream("catalog", e.to_string())
            })?
        };

        let table = PricingTable::new(products);
        debug!(
            requested = ids.len(),
            found = table.len(),
            "pricing table built"
        );

        price_items(&table, items, &self.fees, self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::catalog::{Modifier, ModifierGroup, ProductSize, ProductType};
    use rust_decimal_macros::dec;

    fn latte() -> Product {
        Product {
            id: Uuid::parse_str("8c7d2d4e-0b7f-4c43-9d59-0b1b2d1f9a01").unwrap(),
            name: "Latte".to_string(),
            product_type: ProductType::Drink,
            base_price: dec!(4.00),
            is_active: true,
            in_stock: true,
            sizes: vec![
                ProductSize {
                    name: "Regular".to_string(),
                    price: dec!(4.50),
                },
                ProductSize {
                    name: "Large".to_string(),
                    price: dec!(5.25),
                },
            ],
            modifier_groups: vec![ModifierGroup {
                name: "Milk".to_string(),
                modifiers: vec![
                    Modifier {
                        name: "Oat Milk".to_string(),
                        price: dec!(0.75),
                        is_available: true,
                    },
                    Modifier {
                        name: "Almond Milk".to_string(),
                        price: dec!(0.75),
                        is_available: false,
                    },
                ],
            }],
        }
    }

    fn comic() -> Product {
        Product {
            id: Uuid::parse_str("0f1e2d3c-4b5a-4968-8776-655443322110").unwrap(),
            name: "Saga #1".to_string(),
            product_type: ProductType::Comic,
            base_price: dec!(3.99),
            is_active: true,
            in_stock: true,
            sizes: vec![],
            modifier_groups: vec![],
        }
    }

    fn line(product: &Product, size: Option<&str>, mods: &[&str], qty: u32, price: Decimal) -> ValidatedCartItem {
        ValidatedCartItem {
            product_ref: product.id.to_string(),
            size_name: size.map(str::to_string),
            modifier_names: mods.iter().map(|m| m.to_string()).collect(),
            quantity: qty,
            client_unit_price: price,
        }
    }

    fn price(items: &[ValidatedCartItem]) -> AppResult<Reconciliation> {
        let table = PricingTable::new(vec![latte(), comic()]);
        price_items(&table, items, &FeeSchedule::default(), dec!(0.02))
    }

    #[test]
    fn test_regular_with_oat_milk() {
        let result = price(&[line(&latte(), Some("Regular"), &["Oat Milk"], 2, dec!(5.25))]).unwrap();
        assert_eq!(result.subtotal, dec!(10.50));
        assert_eq!(result.items[0].unit_price, dec!(5.25));
        assert_eq!(result.items[0].size_name.as_deref(), Some("Regular"));
        // 10.50 * 0.03
        assert_eq!(result.platform_fee, dec!(0.32));
    }

    #[test]
    fn test_price_tampering_rejected() {
        let err = price(&[line(&latte(), Some("Regular"), &["Oat Milk"], 2, dec!(3.00))]).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PriceMismatch);
    }

    #[test]
    fn test_tolerance_boundary() {
        let ok = price(&[line(&latte(), Some("Regular"), &[], 1, dec!(4.48))]).unwrap();
        assert_eq!(ok.subtotal, dec!(4.50));
        let ok = price(&[line(&latte(), Some("Regular"), &[], 1, dec!(4.52))]).unwrap();
        assert_eq!(ok.subtotal, dec!(4.50));
        let err = price(&[line(&latte(), Some("Regular"), &[], 1, dec!(4.47))]).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PriceMismatch);
    }

    #[test]
    fn test_size_match_is_case_insensitive() {
        let result = price(&[line(&latte(), Some("  LARGE "), &[], 1, dec!(5.25))]).unwrap();
        assert_eq!(result.items[0].size_name.as_deref(), Some("Large"));
    }

    #[test]
    fn test_unknown_size_falls_back_to_regular() {
        let result = price(&[line(&latte(), Some("Venti"), &[], 1, dec!(4.50))]).unwrap();
        assert_eq!(result.items[0].size_name.as_deref(), Some("Regular"));
    }

    #[test]
    fn test_standard_preferred_over_regular() {
        let mut product = latte();
        product.sizes.push(ProductSize {
            name: "Standard".to_string(),
            price: dec!(4.25),
        });
        let table = PricingTable::new(vec![product.clone()]);
        let result = price_items(
            &table,
            &[line(&product, None, &[], 1, dec!(4.25))],
            &FeeSchedule::default(),
            dec!(0.02),
        )
        .unwrap();
        assert_eq!(result.items[0].size_name.as_deref(), Some("Standard"));
    }

    #[test]
    fn test_sizeless_product_uses_base_price() {
        let result = price(&[line(&comic(), Some("Standard"), &[], 3, dec!(3.99))]).unwrap();
        assert_eq!(result.subtotal, dec!(11.97));
        assert_eq!(result.items[0].size_name, None);
        // 11.97 * 0.015 = 0.17955
        assert_eq!(result.platform_fee, dec!(0.18));
    }

    #[test]
    fn test_unavailable_modifier_rejected() {
        let err = price(&[line(&latte(), Some("Regular"), &["almond milk"], 1, dec!(5.25))]).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ModifierUnavailable);

        let err = price(&[line(&latte(), Some("Regular"), &["Whipped Cream"], 1, dec!(5.25))]).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ModifierUnavailable);
    }

    #[test]
    fn test_out_of_stock_product_rejected() {
        let mut product = latte();
        product.in_stock = false;
        let table = PricingTable::new(vec![product.clone()]);
        let err = price_items(
            &table,
            &[line(&product, Some("Regular"), &[], 1, dec!(4.50))],
            &FeeSchedule::default(),
            dec!(0.02),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ProductUnavailable);
    }

    #[test]
    fn test_unknown_and_malformed_ids_not_found() {
        let mut item = line(&latte(), Some("Regular"), &[], 1, dec!(4.50));
        item.product_ref = Uuid::new_v4().to_string();
        assert_eq!(price(&[item.clone()]).unwrap_err().error_code(), ErrorCode::ProductNotFound);

        item.product_ref = "latte".to_string();
        assert_eq!(price(&[item]).unwrap_err().error_code(), ErrorCode::ProductNotFound);
    }

    #[test]
    fn test_duplicate_products_priced_per_line() {
        let result = price(&[
            line(&latte(), Some("Regular"), &[], 1, dec!(4.50)),
            line(&latte(), Some("Large"), &["Oat Milk"], 2, dec!(6.00)),
            line(&comic(), None, &[], 1, dec!(3.99)),
        ])
        .unwrap();
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.subtotal, dec!(4.50) + dec!(12.00) + dec!(3.99));
    }

    #[test]
    fn test_subtotal_ignores_client_prices_within_tolerance() {
        let a = price(&[line(&latte(), Some("Regular"), &[], 5, dec!(4.48))]).unwrap();
        let b = price(&[line(&latte(), Some("Regular"), &[], 5, dec!(4.52))]).unwrap();
        assert_eq!(a.subtotal, b.subtotal);
        assert_eq!(a.subtotal, dec!(22.50));
    }
}
