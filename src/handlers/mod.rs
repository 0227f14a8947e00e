//! HTTP handlers, one module per resource.

pub mod health;
pub mod offers;
pub mod orders;
pub mod products;
pub mod rate_limit;
pub mod warehouses;
