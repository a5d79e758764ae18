//! Data Transfer Objects (DTOs) for API requests and responses

pub mod common;
pub mod settlement;

pub use common::*;
pub use settlement::*;
