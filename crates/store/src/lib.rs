//! Transactional storage for the checkout engine.
//!
//! The engine never talks to a database directly: it opens a
//! [`UnitOfWork`] from a [`CheckoutStore`], performs its reads and writes
//! through it, and commits or rolls back as one unit.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PostgresStore, PostgresUnitOfWork};
pub use store::{CheckoutStore, UnitOfWork};
