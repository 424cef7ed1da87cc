//! Domain types shared by the checkout pipeline.
//!
//! `catalog` holds the authoritative product data read from the store,
//! `cart` holds the untrusted request shapes and their validated/verified
//! counterparts, `order` holds what gets persisted once a payment succeeds.

pub mod cart;
pub mod catalog;
pub mod order;
