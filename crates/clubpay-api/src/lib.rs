//! API layer for ClubPay
//!
//! HTTP handlers for creating settlements, tracking payments, and sharing
//! billing messages, plus a WebSocket feed of settlement changes.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, PaginationParams};

pub use handlers::{configure_health, configure_settlements, ws_settlement_handler};
