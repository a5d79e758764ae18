//! HTTP request handlers

pub mod health;
pub mod settlement;
pub mod ws;

pub use health::configure as configure_health;
pub use settlement::configure as configure_settlements;
pub use ws::ws_settlement_handler;
