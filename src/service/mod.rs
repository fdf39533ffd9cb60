//! Application services
//!
//! Each service owns an `Arc<dyn Store>` and is cheap to clone into handlers.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod inventory;
pub mod ledger;

pub use auth::AuthService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use dashboard::DashboardService;
pub use inventory::InventoryService;
pub use ledger::Ledger;
