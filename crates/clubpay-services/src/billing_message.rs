//! Billing message rendering
//!
//! Turns a settlement snapshot, resolved with member names and meeting
//! details, into the text members receive. Rendering is stateless; it is
//! called again every time the underlying settlement changes.

use chrono::Datelike;
use clubpay_core::models::{CostTotals, Meeting, MemberId, SettlementSnapshot};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;

use crate::constants::{CURRENCY_UNIT, MESSAGE_HEADER};

/// One member line of a billing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingLine {
    pub member_id: MemberId,
    pub name: String,
    pub amount: i64,
    pub exclude_food: bool,
    pub is_paid: bool,
}

/// Everything the formatter needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingDetails {
    pub meeting: Option<Meeting>,
    pub totals: CostTotals,
    pub total_amount: i64,
    pub per_person: i64,
    pub members: Vec<BillingLine>,
}

impl BillingDetails {
    /// Join a snapshot with directory data. Members missing from the
    /// directory are shown by id.
    pub fn from_snapshot(
        snapshot: &SettlementSnapshot,
        names: &HashMap<MemberId, String>,
        meeting: Option<Meeting>,
    ) -> Self {
        let members = snapshot
            .members
            .iter()
            .map(|m| BillingLine {
                member_id: m.member_id,
                name: names
                    .get(&m.member_id)
                    .cloned()
                    .unwrap_or_else(|| format!("회원 #{}", m.member_id)),
                amount: m.amount,
                exclude_food: m.exclude_food,
                is_paid: m.is_paid,
            })
            .collect();

        Self {
            meeting,
            totals: snapshot.settlement.totals(),
            total_amount: snapshot.settlement.total_amount,
            per_person: snapshot.settlement.per_person,
            members,
        }
    }

    fn unpaid_names(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| !m.is_paid)
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Representative amount of a food tier: first positive amount, else baseline
    fn tier_amount(&self, exclude_food: bool) -> i64 {
        self.members
            .iter()
            .find(|m| m.exclude_food == exclude_food && m.amount > 0)
            .map(|m| m.amount)
            .unwrap_or(self.per_person)
    }
}

/// Billing message formatter
#[derive(Debug, Clone)]
pub struct BillingMessageFormatter {
    header: String,
    currency_unit: String,
}

impl Default for BillingMessageFormatter {
    fn default() -> Self {
        Self::new(MESSAGE_HEADER, CURRENCY_UNIT)
    }
}

impl BillingMessageFormatter {
    pub fn new(header: impl Into<String>, currency_unit: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            currency_unit: currency_unit.into(),
        }
    }

    fn money(&self, amount: i64) -> String {
        format_amount(amount, &self.currency_unit)
    }

    /// Render the message
    pub fn format(&self, details: &BillingDetails) -> String {
        let mut out = String::new();

        // writeln! into a String cannot fail
        let _ = writeln!(out, "{}", self.header);

        if let Some(meeting) = &details.meeting {
            out.push('\n');
            let date = meeting.date;
            let _ = writeln!(
                out,
                "날짜: {}년 {}월 {}일",
                date.year(),
                date.month(),
                date.day()
            );
            if let Some(location) = meeting.location.as_deref().filter(|l| !l.is_empty()) {
                let _ = writeln!(out, "장소: {}", location);
            }
        }

        out.push('\n');
        let _ = writeln!(out, "[비용 내역]");
        let _ = writeln!(out, "게임비: {}", self.money(details.totals.game_fee));
        if details.totals.food_fee > 0 {
            let _ = writeln!(out, "식비: {}", self.money(details.totals.food_fee));
        }
        if details.totals.other_fee > 0 {
            let _ = writeln!(out, "기타: {}", self.money(details.totals.other_fee));
        }
        let _ = writeln!(out, "총액: {}", self.money(details.total_amount));

        out.push('\n');
        let _ = writeln!(out, "[1인당 금액]");
        let excluded: Vec<&str> = details
            .members
            .iter()
            .filter(|m| m.exclude_food)
            .map(|m| m.name.as_str())
            .collect();

        if !excluded.is_empty() && details.totals.food_fee > 0 {
            let _ = writeln!(out, "식사 참여: {}", self.money(details.tier_amount(false)));
            let _ = writeln!(out, "식사 불참: {}", self.money(details.tier_amount(true)));
            let _ = writeln!(out, "식사 불참자: {}", excluded.join(", "));
        } else {
            let _ = writeln!(out, "1인당: {}", self.money(details.per_person));
        }

        let unpaid = details.unpaid_names();
        if !unpaid.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "미입금: {}", unpaid.join(", "));
        }

        out.trim_end().to_string()
    }
}

/// Render an amount with thousands separators and a unit suffix
///
/// ```
/// use clubpay_services::format_amount;
/// assert_eq!(format_amount(1234567, "원"), "1,234,567원");
/// ```
pub fn format_amount(amount: i64, unit: &str) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + unit.len() + 1);

    if amount < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped.push_str(unit);
    grouped
}
