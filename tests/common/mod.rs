//! In-memory doubles and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, Router};
use blackbird_backend::api::{build_router, AppState};
use blackbird_backend::config::{CheckoutConfig, RateLimitSettings};
use blackbird_backend::database::error::{DatabaseError, DatabaseErrorKind};
use blackbird_backend::database::repository::{CatalogReader, InsertOutcome, OrderStore};
use blackbird_backend::health::HealthChecker;
use blackbird_backend::models::catalog::{
    Modifier, ModifierGroup, Product, ProductSize, ProductType,
};
use blackbird_backend::models::order::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus,
};
use blackbird_backend::payments::error::{PaymentError, PaymentResult};
use blackbird_backend::payments::providers::stripe::{StripeConfig, StripeProvider};
use blackbird_backend::payments::types::{
    PaymentIntent, PaymentIntentRequest, PaymentIntentStatus, WebhookEvent,
};
use blackbird_backend::payments::utils::compute_signature;
use blackbird_backend::payments::PaymentProcessor;
use blackbird_backend::services::{
    CheckoutService, InMemoryRateLimiter, OrderMaterializer, PaymentIntentIssuer,
    PriceReconciler, RateLimitPolicies, WebhookProcessor,
};
use http::{HeaderMap, Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";
pub const LATTE_ID: &str = "8c7d2d4e-0b7f-4c43-9d59-0b1b2d1f9a01";
pub const SOLD_OUT_COMIC_ID: &str = "2f4b8a55-9c1e-4d0a-8b3e-6a7f1c2d3e04";

// ============================================================================
// Catalog
// ============================================================================

pub fn latte() -> Product {
    Product {
        id: Uuid::parse_str(LATTE_ID).unwrap(),
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

pub fn sold_out_comic() -> Product {
    Product {
        id: Uuid::parse_str(SOLD_OUT_COMIC_ID).unwrap(),
        name: "Night Owls #1".to_string(),
        product_type: ProductType::Comic,
        base_price: dec!(4.99),
        is_active: true,
        in_stock: false,
        sizes: Vec::new(),
        modifier_groups: Vec::new(),
    }
}

pub struct InMemoryCatalog {
    products: Vec<Product>,
    pub fetches: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn fetch_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, DatabaseError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .products
            .iter()
            .filter(|product| ids.contains(&product.id))
            .cloned()
            .collect())
    }
}

// ============================================================================
// Order store
// ============================================================================

/// Enforces the payment-intent uniqueness the real table has.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<Vec<Order>>,
    items: Mutex<Vec<OrderItem>>,
    pub order_inserts: AtomicUsize,
    /// Fail every order insert.
    pub fail_orders: AtomicBool,
    /// Fail every item insert.
    pub fail_items: AtomicBool,
    /// Answer this many payment-intent lookups with "not found", as if a
    /// concurrent writer had not committed yet.
    pub stale_lookups: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn items_for(&self, order_id: Uuid) -> Vec<OrderItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let stale = self
            .stale_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }

        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|order| order.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<InsertOutcome, DatabaseError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::PoolTimeout));
        }

        let mut orders = self.orders.lock().unwrap();
        if orders
            .iter()
            .any(|existing| existing.payment_intent_id == order.payment_intent_id)
        {
            return Ok(InsertOutcome::Conflict);
        }

        let now = chrono::Utc::now();
        let created = Order {
            id: Uuid::new_v4(),
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            subtotal: order.subtotal,
            tax: order.tax,
            total: order.total,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Paid,
            payment_intent_id: order.payment_intent_id.clone(),
            special_instructions: order.special_instructions.clone(),
            source: order.source,
            created_at: now,
            updated_at: now,
        };
        orders.push(created.clone());
        self.order_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(InsertOutcome::Inserted(created))
    }

    async fn insert_items(
        &self,
        order_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<u64, DatabaseError> {
        if self.fail_items.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "connection reset".to_string(),
            }));
        }

        let mut stored = self.items.lock().unwrap();
        for item in items {
            stored.push(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                size_name: item.size_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                modifiers: item.modifiers.clone(),
                created_at: chrono::Utc::now(),
            });
        }
        Ok(items.len() as u64)
    }

    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderWithItems>, DatabaseError> {
        let order = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|order| order.order_number == order_number)
            .cloned();

        Ok(order.map(|order| {
            let items = self.items_for(order.id);
            OrderWithItems { order, items }
        }))
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|order| order.id == order_id)
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "order".to_string(),
                    id: order_id.to_string(),
                })
            })?;

        if !order.status.can_transition_to(next) {
            return Err(DatabaseError::new(DatabaseErrorKind::InvalidTransition {
                from: order.status.to_string(),
                to: next.to_string(),
            }));
        }

        order.status = next;
        order.updated_at = chrono::Utc::now();
        Ok(order.clone())
    }
}

// ============================================================================
// Payment processor
// ============================================================================

/// Records authorization requests; webhook verification is the real Stripe
/// implementation keyed with [`WEBHOOK_SECRET`].
pub struct MockProcessor {
    verifier: StripeProvider,
    pub requests: Mutex<Vec<PaymentIntentRequest>>,
    pub fail_create: AtomicBool,
    counter: AtomicUsize,
}

impl MockProcessor {
    pub fn new() -> Self {
        let config = StripeConfig {
            secret_key: "sk_test_unused".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            ..Default::default()
        };
        Self {
            verifier: StripeProvider::new(config).unwrap(),
            requests: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<PaymentIntentRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> PaymentResult<PaymentIntent> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PaymentError::NetworkError {
                message: "connection refused".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_3NblackbirdTest{:06}", n);
        self.requests.lock().unwrap().push(request.clone());

        Ok(PaymentIntent {
            client_secret: Some(format!("{}_secret_abc", id)),
            id,
            amount: request.amount,
            currency: request.currency,
            status: PaymentIntentStatus::RequiresPaymentMethod,
            metadata: request.metadata.into_iter().collect::<HashMap<_, _>>(),
            receipt_email: request.receipt_email,
            last_payment_error: None,
        })
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> PaymentResult<WebhookEvent> {
        self.verifier.construct_event(payload, signature_header)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// Application
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrderStore>,
    pub processor: Arc<MockProcessor>,
    pub materializer: OrderMaterializer,
}

/// Limits high enough that only the dedicated tests ever hit them.
pub fn relaxed_policies() -> RateLimitPolicies {
    RateLimitPolicies::from_settings(&RateLimitSettings {
        checkout: 1_000,
        orders: 1_000,
        webhook: 1_000,
        api: 1_000,
        ..Default::default()
    })
}

pub fn build_app() -> TestApp {
    build_app_with(relaxed_policies())
}

pub fn build_app_with(policies: RateLimitPolicies) -> TestApp {
    let catalog = Arc::new(InMemoryCatalog::new(vec![latte(), sold_out_comic()]));
    let orders = Arc::new(InMemoryOrderStore::default());
    let processor = Arc::new(MockProcessor::new());
    let checkout_config = CheckoutConfig::default();

    let reconciler = PriceReconciler::new(
        catalog.clone(),
        checkout_config.fees.clone(),
        checkout_config.price_tolerance,
    );
    let issuer = PaymentIntentIssuer::new(processor.clone(), checkout_config.clone(), None);
    let materializer = OrderMaterializer::new(orders.clone());

    let state = AppState {
        checkout: CheckoutService::new(reconciler, issuer, checkout_config.max_cart_items),
        materializer: materializer.clone(),
        webhooks: Arc::new(WebhookProcessor::new(
            processor.clone(),
            materializer.clone(),
        )),
        rate_limiter: Arc::new(InMemoryRateLimiter::new()),
        policies,
        health: HealthChecker::new(None),
    };

    TestApp {
        router: build_router(state, &[]),
        catalog,
        orders,
        processor,
        materializer,
    }
}

// ============================================================================
// Requests
// ============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn signed_webhook(payload: &str) -> Request<Body> {
    let now = chrono::Utc::now().timestamp();
    let signature = compute_signature(payload.as_bytes(), now, WEBHOOK_SECRET);
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", format!("t={},v1={}", now, signature))
        .body(Body::from(payload.to_string()))
        .unwrap()
}

// ============================================================================
// Payloads
// ============================================================================

pub fn customer() -> Value {
    json!({
        "name": "Jo Reader",
        "email": "Jo@Example.com",
        "phone": "(555) 123-4567"
    })
}

/// Scenario cart: Regular latte with oat milk, two of them.
pub fn latte_line(quantity: Value, unit_price: Decimal) -> Value {
    json!({
        "id": "line-1",
        "product": { "id": LATTE_ID, "name": "Latte" },
        "size": { "name": "Regular", "price": 4.50 },
        "modifiers": [{ "name": "Oat Milk", "price": 0.75 }],
        "quantity": quantity,
        "unitPrice": unit_price,
        "totalPrice": unit_price * dec!(2)
    })
}

pub fn checkout_body(items: Vec<Value>) -> Value {
    json!({
        "items": items,
        "customer": customer(),
        "instructions": "Extra hot please"
    })
}

/// Event JSON for a payment intent carrying `metadata`.
pub fn payment_event(
    event_type: &str,
    payment_intent_id: &str,
    amount: i64,
    metadata: &Value,
) -> String {
    let succeeded = event_type == "payment_intent.succeeded";
    let status = if succeeded {
        "succeeded"
    } else {
        "requires_payment_method"
    };
    let last_payment_error = if event_type == "payment_intent.payment_failed" {
        json!({ "message": "Your card was declined." })
    } else {
        Value::Null
    };

    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": {
            "id": payment_intent_id,
            "object": "payment_intent",
            "amount": amount,
            "currency": "usd",
            "status": status,
            "metadata": metadata,
            "last_payment_error": last_payment_error
        }}
    })
    .to_string()
}

/// Run a checkout for the scenario cart and return the issued payment id
/// with the metadata the processor received.
pub async fn checkout_scenario_cart(app: &TestApp) -> (String, Value) {
    let response = send(
        &app.router,
        post_json(
            "/api/checkout",
            &checkout_body(vec![latte_line(json!(2), dec!(5.25))]),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);

    let payment_intent_id = response.body["paymentIntentId"]
        .as_str()
        .unwrap()
        .to_string();
    let request = app.processor.last_request().unwrap();
    (payment_intent_id, serde_json::to_value(request.metadata).unwrap())
}

/// Client order body mirroring what the storefront posts after payment.
pub fn client_order_body(payment_intent_id: &str) -> Value {
    json!({
        "paymentIntentId": payment_intent_id,
        "customer": customer(),
        "items": [{
            "productId": LATTE_ID,
            "productName": "Latte",
            "sizeName": "Regular",
            "quantity": 2,
            "unitPrice": 5.25,
            "modifiers": [{ "name": "Oat Milk", "price": 0.75 }]
        }],
        "subtotal": 10.50,
        "tax": 0.63,
        "total": 11.13,
        "instructions": "Extra hot please"
    })
}
