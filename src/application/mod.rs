//! Application layer orchestrating payments across channels.
//!
//! [`coordinator::PaymentCoordinator`] is the entry point. It wires the shared
//! state store, webhook cache and finalizer into one coordinator per channel,
//! and owns the background sweeps.

pub mod coordinator;
pub mod dispatcher;
pub mod event_logger;
pub mod finalizer;
pub mod link;
pub mod manual;
pub mod state_store;
pub mod sweeper;
pub mod terminal;
pub mod webhook_cache;
