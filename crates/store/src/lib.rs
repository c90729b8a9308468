//! Persistence boundary for the checkout workflows.
//!
//! A [`Store`] hands out [`Transaction`]s; each workflow does all of its work
//! through one of them and commits once. Two implementations are provided:
//! [`InMemoryStore`] for tests and local runs, [`PostgresStore`] for
//! production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{PAYMENT_ORDER_CONSTRAINT, PAYMENT_TRANSACTION_CONSTRAINT, Store, Transaction};
