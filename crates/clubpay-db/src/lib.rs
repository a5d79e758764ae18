//! ClubPay Database Layer
//!
//! This crate provides storage for settlements and read access to the
//! member and meeting directories. It includes:
//!
//! - Connection pool management and migrations with sqlx
//! - PostgreSQL repository implementations of the core traits
//! - Transactional creation of a settlement with its member rows
//! - An in-memory store implementing the same traits

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::InMemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use clubpay_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
