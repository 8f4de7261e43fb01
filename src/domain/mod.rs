//! Domain model and ports.
//!
//! Nothing in here performs I/O. Adapters in `infrastructure` implement the
//! traits in [`ports`]; the `application` layer drives them.

pub mod cart;
pub mod ledger;
pub mod payment;
pub mod ports;
pub mod processor;
pub mod progress;
pub mod tipping;
