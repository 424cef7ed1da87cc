//! Blackbird backend: server-side price verification, payment intent
//! creation and idempotent order materialization for the storefront.

pub mod api;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod services;
pub mod workers;
