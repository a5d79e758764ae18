//! Business logic services for ClubPay
//!
//! # Services
//!
//! - `FeeAllocationEngine` - per-member fee computation (game counts,
//!   discounts, exclusions, penalties, team amounts, 1000-unit rounding)
//! - `EqualSplitAllocator` - headcount split of aggregate totals
//! - `SettlementLedger` - settlement lifecycle and payment tracking
//! - `BillingMessageFormatter` - shareable text rendering of a settlement
//!
//! The allocators and the formatter are pure. Only the ledger touches
//! storage, always through the traits in `clubpay_core::traits`.

pub mod allocation;
pub mod billing_message;
pub mod equal_split;
pub mod events;
pub mod ledger;

pub use allocation::{Allocation, FeeAllocationEngine};
pub use billing_message::{format_amount, BillingDetails, BillingLine, BillingMessageFormatter};
pub use equal_split::{EqualSplitAllocator, EqualSplitShares};
pub use events::{SettlementEvent, SettlementEventKind, SettlementFeed};
pub use ledger::SettlementLedger;

/// Business logic constants
pub mod constants {
    /// Per-member amounts are rounded up to a multiple of this
    pub const ROUNDING_UNIT: i64 = 1000;

    /// Suffix for rendered amounts
    pub const CURRENCY_UNIT: &str = "원";

    /// First line of the billing message
    pub const MESSAGE_HEADER: &str = "[모임 정산 안내]";

    /// Buffered change events per subscriber
    pub const FEED_CAPACITY: usize = 64;
}
