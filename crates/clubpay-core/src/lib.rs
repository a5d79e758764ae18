//! ClubPay Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the ClubPay settlement system. It includes:
//!
//! - Domain models (Settlement, SettlementMember, allocation inputs)
//! - Storage and directory traits consumed by the services
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
