//! Equal-split allocation
//!
//! Used when only aggregate totals are known. Game and other fees are divided
//! by headcount, food by the number of members who ate. Integer division
//! remainders are dropped, not handed to anyone, and a zero divisor yields a
//! zero share. No rounding unit, penalties, team amounts or game counts apply.

use clubpay_core::{
    models::{CostTotals, MemberFlagSet, MemberId, SettlementMemberDraft},
    AppError, AppResult,
};
use serde::Serialize;

/// Per-person shares produced by an equal split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EqualSplitShares {
    /// `floor((game_fee + other_fee) / headcount)`, charged to everyone
    pub base_per_person: i64,
    /// `floor(food_fee / food_participants)`, charged to members who ate
    pub food_per_person: i64,
}

/// Headcount-based allocator
pub struct EqualSplitAllocator;

impl EqualSplitAllocator {
    /// Compute shares from a headcount and the number of food-excluded members
    pub fn shares(
        headcount: usize,
        game_and_other_fee: i64,
        food_fee: i64,
        excluded_food_count: usize,
    ) -> EqualSplitShares {
        let food_participants = headcount.saturating_sub(excluded_food_count);

        EqualSplitShares {
            base_per_person: divide_or_zero(game_and_other_fee, headcount),
            food_per_person: divide_or_zero(food_fee, food_participants),
        }
    }

    /// Shares for a concrete attendee list
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the game and other fees do not sum
    /// within `i64`.
    pub fn shares_for(
        member_ids: &[MemberId],
        totals: &CostTotals,
        flags: &MemberFlagSet,
    ) -> AppResult<EqualSplitShares> {
        let game_and_other_fee = totals
            .game_fee
            .checked_add(totals.other_fee)
            .ok_or_else(|| AppError::InvalidInput("Cost totals are out of range".to_string()))?;

        Ok(Self::shares(
            member_ids.len(),
            game_and_other_fee,
            totals.food_fee,
            flags.excluded_food_count(member_ids),
        ))
    }

    /// One draft per attendee. Only the food exclusion is recorded since no
    /// other flag affects this strategy.
    pub fn allocate(
        member_ids: &[MemberId],
        totals: &CostTotals,
        flags: &MemberFlagSet,
    ) -> AppResult<Vec<SettlementMemberDraft>> {
        let shares = Self::shares_for(member_ids, totals, flags)?;

        member_ids
            .iter()
            .map(|&member_id| {
                let exclude_food = flags.get(member_id).exclude_food;
                let food = if exclude_food {
                    0
                } else {
                    shares.food_per_person
                };
                let amount = shares.base_per_person.checked_add(food).ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "Amount for member {} is out of range",
                        member_id
                    ))
                })?;

                Ok(SettlementMemberDraft {
                    member_id,
                    amount,
                    exclude_food,
                    exclude_game: false,
                    has_penalty: false,
                    is_discounted: false,
                    is_paid: false,
                })
            })
            .collect()
    }
}

#[inline]
fn divide_or_zero(amount: i64, count: usize) -> i64 {
    if count == 0 {
        0
    } else {
        amount / count as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubpay_core::models::FlagLists;

    #[test]
    fn test_scenario_e_remainder_is_dropped() {
        let totals = CostTotals::new(7000, 0, 3000);
        let flags = MemberFlagSet::default();

        let drafts = EqualSplitAllocator::allocate(&[1, 2, 3], &totals, &flags).unwrap();

        assert!(drafts.iter().all(|d| d.amount == 3333));
        let allocated: i64 = drafts.iter().map(|d| d.amount).sum();
        assert_eq!(allocated, 9999);
        assert_eq!(totals.game_fee + totals.other_fee - allocated, 1);
    }

    #[test]
    fn test_food_split_among_participants_only() {
        let totals = CostTotals::new(9000, 10000, 0);
        let flags = MemberFlagSet::from_lists(
            &FlagLists {
                exclude_food_member_ids: vec![3],
                ..Default::default()
            },
            None,
        );

        let drafts = EqualSplitAllocator::allocate(&[1, 2, 3], &totals, &flags).unwrap();

        assert_eq!(drafts[0].amount, 3000 + 5000);
        assert_eq!(drafts[1].amount, 3000 + 5000);
        assert_eq!(drafts[2].amount, 3000);
        assert!(drafts[2].exclude_food);
    }

    #[test]
    fn test_zero_participants_yield_zero_shares() {
        assert_eq!(
            EqualSplitAllocator::shares(0, 10000, 5000, 0),
            EqualSplitShares {
                base_per_person: 0,
                food_per_person: 0,
            }
        );

        // Everyone skipped food
        let shares = EqualSplitAllocator::shares(2, 10000, 5000, 2);
        assert_eq!(shares.base_per_person, 5000);
        assert_eq!(shares.food_per_person, 0);
    }

    #[test]
    fn test_no_rounding_or_penalty() {
        let totals = CostTotals::new(1001, 0, 0);
        let flags = MemberFlagSet::from_lists(
            &FlagLists {
                has_penalty_member_ids: vec![1],
                is_discounted_member_ids: vec![1],
                ..Default::default()
            },
            None,
        );

        let drafts = EqualSplitAllocator::allocate(&[1], &totals, &flags).unwrap();

        assert_eq!(drafts[0].amount, 1001);
        assert!(!drafts[0].has_penalty);
        assert!(!drafts[0].is_discounted);
    }

    #[test]
    fn test_overflowing_fee_sum_is_rejected() {
        let totals = CostTotals::new(i64::MAX, 0, 1);
        let flags = MemberFlagSet::default();

        assert!(matches!(
            EqualSplitAllocator::shares_for(&[1, 2], &totals, &flags),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            EqualSplitAllocator::allocate(&[1, 2], &totals, &flags),
            Err(AppError::InvalidInput(_))
        ));
    }
}
