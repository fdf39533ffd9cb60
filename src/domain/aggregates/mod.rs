//! Aggregates module
pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{CartItemView, CartLine, CartLineDetail, CartView};
pub use order::{
    ApplyOutcome, ContactInfo, LineSnapshot, NewOrder, OrderItem, OrderLineRequest,
    PaymentStatus, PaymentTransaction, PlacedOrder, ShippingDetails, ShippingMethod,
    StatusDecision, StatusUpdate, StockAdjustment, StockEffect,
};
pub use product::{CategoryPatch, NewCategory, NewProduct, Product, ProductCategory, ProductPatch};
pub use user::{NewUser, ProfileUpdate, Role, User};
