//! Repository implementations
//!
//! Concrete PostgreSQL implementations of the storage and directory traits
//! defined in clubpay-core.

pub mod directory_repo;
pub mod settlement_repo;

pub use directory_repo::{PgMeetingDirectory, PgMemberDirectory};
pub use settlement_repo::PgSettlementRepository;
