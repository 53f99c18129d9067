//! Local domain models and the write plans handed to repositories.
//!
//! Read models (`Store`, `Product`, `Order`, ...) mirror the persisted rows.
//! Write plans (`ProductWrite`, `OrderWrite`, ...) are fully resolved by the
//! import services before a repository applies them in one transaction.

pub mod customer;
pub mod order;
pub mod product;
pub mod store;

pub use customer::{Customer, CustomerWrite};
pub use order::{Order, OrderAggregate, OrderItem, OrderItemWrite, OrderWrite};
pub use product::{Product, ProductAggregate, ProductWrite, Variant, VariantWrite};
pub use store::{
    NewStore, PurgeReport, PurgeTarget, Store, StoreCount, StoreCounts, StoreDetails, StoreIdentity,
};
