//! Storefront backend
//!
//! Catalog, per-user carts, checkout through a hosted payment page and an
//! order ledger reconciled from provider webhooks.
//!
//! ## Layout
//! - `domain`: aggregates, value objects, domain events
//! - `store`: persistence traits with Postgres and in-memory backends
//! - `service`: catalog, inventory, cart, ledger, checkout, auth, dashboards
//! - `payment`: provider seam, Stripe adapter, webhook signatures
//! - `api`: axum handlers, extractors and the response envelope

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod payment;
pub mod service;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{EcommerceError, Result};
