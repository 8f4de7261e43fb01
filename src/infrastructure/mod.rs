//! Adapters implementing the domain ports.

pub mod broadcast;
pub mod csv_ledger;
pub mod in_memory;
pub mod signature;
pub mod stripe;
