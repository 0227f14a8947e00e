//! Core operations. Every SQL statement of the application lives here.

pub mod offers;
pub mod orders;
pub mod products;
pub mod warehouses;
