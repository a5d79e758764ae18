//! Fee allocation
//!
//! Computes what every attendee owes from the cost configuration and the
//! member's flags:
//!
//! 1. game fee (zero when excluded, half rate when discounted)
//! 2. other fee, for everyone
//! 3. food fee, unless excluded
//! 4. penalty, when flagged
//! 5. team amount, winner roster checked first
//! 6. clamp at zero, then round up to the rounding unit
//!
//! The discounted rate is truncated before it is multiplied by the game
//! count, so `3 * (2001 / 2)` and not `(3 * 2001) / 2`.

use clubpay_core::{
    models::{
        AllocationStrategy, CostTotals, MemberFlagSet, MemberFlags, MemberId,
        PerMemberCostConfig, SettlementMemberDraft, SettlementRequest, TeamSide,
    },
    AppError, AppResult,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

use crate::constants::ROUNDING_UNIT;
use crate::equal_split::EqualSplitAllocator;

/// Result of running an allocation strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    /// One draft per attendee, in attendee order
    pub members: Vec<SettlementMemberDraft>,
    /// Baseline per-person reference stored on the settlement
    pub per_person: i64,
    /// `game_fee + food_fee + other_fee` as entered
    pub total_amount: i64,
    /// Sum of the drafted member amounts; may differ from `total_amount`
    pub allocated_total: i64,
}

/// Per-member fee allocation engine
#[derive(Debug, Clone, Copy)]
pub struct FeeAllocationEngine {
    rounding_unit: i64,
}

impl Default for FeeAllocationEngine {
    fn default() -> Self {
        Self {
            rounding_unit: ROUNDING_UNIT,
        }
    }
}

impl FeeAllocationEngine {
    /// Create an engine rounding to `rounding_unit` (values below 1 disable rounding)
    pub fn new(rounding_unit: i64) -> Self {
        Self {
            rounding_unit: rounding_unit.max(1),
        }
    }

    /// Allocate with the per-member strategy
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the attendee list is empty or has
    /// duplicates, if a cost input or game count is negative, or if a
    /// member's amount does not fit in an `i64`.
    #[instrument(skip(self, config, flags), fields(attendees = member_ids.len()))]
    pub fn allocate(
        &self,
        member_ids: &[MemberId],
        config: &PerMemberCostConfig,
        flags: &MemberFlagSet,
    ) -> AppResult<Vec<SettlementMemberDraft>> {
        validate_attendees(member_ids)?;
        validate_cost_config(config)?;

        member_ids
            .iter()
            .map(|&member_id| {
                let member_flags = flags.get(member_id);
                if member_flags.game_count < 0 {
                    return Err(AppError::InvalidInput(format!(
                        "Game count for member {} is negative: {}",
                        member_id, member_flags.game_count
                    )));
                }

                let amount = self.member_amount(config, &member_flags).ok_or_else(|| {
                    warn!(member_id, "Rejected allocation with overflowing amount");
                    AppError::InvalidInput(format!(
                        "Amount for member {} is out of range",
                        member_id
                    ))
                })?;
                debug!(member_id, amount, "Allocated member amount");

                Ok(SettlementMemberDraft {
                    member_id,
                    amount,
                    exclude_food: member_flags.exclude_food,
                    exclude_game: member_flags.exclude_game,
                    has_penalty: member_flags.has_penalty,
                    is_discounted: member_flags.is_discounted,
                    is_paid: false,
                })
            })
            .collect()
    }

    /// Final owed amount for one member, `None` on overflow
    pub fn member_amount(
        &self,
        config: &PerMemberCostConfig,
        flags: &MemberFlags,
    ) -> Option<i64> {
        let mut amount = Self::game_component(config, flags)?
            .checked_add(config.other_per_person)?
            .checked_add(Self::food_component(config, flags))?;

        if flags.has_penalty {
            amount = amount.checked_add(config.penalty_amount)?;
        }

        if let Some(team) = &config.team_match {
            match flags.team {
                Some(TeamSide::Winner) => amount = amount.checked_add(team.winner_team_amount)?,
                Some(TeamSide::Loser) => amount = amount.checked_add(team.loser_team_amount)?,
                None => {}
            }
        }

        self.round_up(amount.max(0))
    }

    /// Game-fee contribution before any add-ons, `None` on overflow
    pub fn game_component(config: &PerMemberCostConfig, flags: &MemberFlags) -> Option<i64> {
        if flags.exclude_game {
            Some(0)
        } else if flags.is_discounted {
            flags.game_count.checked_mul(config.game_fee_per_game / 2)
        } else {
            flags.game_count.checked_mul(config.game_fee_per_game)
        }
    }

    fn food_component(config: &PerMemberCostConfig, flags: &MemberFlags) -> i64 {
        if flags.exclude_food {
            0
        } else {
            config.food_per_person
        }
    }

    /// Round a non-negative amount up to the next multiple of the unit
    ///
    /// `None` when the rounded value would exceed `i64::MAX`.
    #[inline]
    pub fn round_up(&self, amount: i64) -> Option<i64> {
        let unit = self.rounding_unit;
        amount.checked_add(unit - 1)?.checked_div(unit)?.checked_mul(unit)
    }

    /// Run whichever strategy the request names
    ///
    /// The per-member strategy stores `floor(total / headcount)` as the
    /// baseline; the equal split stores what a food-included member owes.
    #[instrument(
        skip(self, request),
        fields(meeting_id = request.meeting_id, strategy = request.strategy.name())
    )]
    pub fn plan(&self, request: &SettlementRequest) -> AppResult<Allocation> {
        validate_attendees(&request.member_ids)?;
        validate_totals(&request.totals)?;

        let total_amount = request.totals.total();

        let (members, per_person) = match &request.strategy {
            AllocationStrategy::PerMember(config) => {
                let flags =
                    MemberFlagSet::from_lists(&request.flags, config.team_match.as_ref());
                let members = self.allocate(&request.member_ids, config, &flags)?;
                let headcount = request.member_ids.len() as i64;
                (members, total_amount / headcount)
            }
            AllocationStrategy::EqualSplit => {
                let flags = MemberFlagSet::from_lists(&request.flags, None);
                let shares =
                    EqualSplitAllocator::shares_for(&request.member_ids, &request.totals, &flags)?;
                let members =
                    EqualSplitAllocator::allocate(&request.member_ids, &request.totals, &flags)?;
                (members, shares.base_per_person + shares.food_per_person)
            }
        };

        let allocated_total = members
            .iter()
            .try_fold(0i64, |acc, m| acc.checked_add(m.amount))
            .ok_or_else(|| {
                AppError::InvalidInput("Allocated amounts are out of range".to_string())
            })?;
        if allocated_total != total_amount {
            debug!(
                total_amount,
                allocated_total, "Allocated amounts differ from entered total"
            );
        }

        Ok(Allocation {
            members,
            per_person,
            total_amount,
            allocated_total,
        })
    }
}

/// Attendees must be present and unique
pub fn validate_attendees(member_ids: &[MemberId]) -> AppResult<()> {
    if member_ids.is_empty() {
        warn!("Rejected allocation with no attendees");
        return Err(AppError::InvalidInput(
            "At least one attendee is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(member_ids.len());
    for id in member_ids {
        if !seen.insert(*id) {
            warn!(member_id = id, "Rejected allocation with duplicate attendee");
            return Err(AppError::InvalidInput(format!(
                "Duplicate attendee id: {}",
                id
            )));
        }
    }

    Ok(())
}

/// Entered cost totals must be non-negative and sum within `i64`
pub fn validate_totals(totals: &CostTotals) -> AppResult<()> {
    for (name, value) in [
        ("game_fee", totals.game_fee),
        ("food_fee", totals.food_fee),
        ("other_fee", totals.other_fee),
    ] {
        if value < 0 {
            return Err(AppError::InvalidInput(format!(
                "{} must not be negative: {}",
                name, value
            )));
        }
    }

    if totals.checked_total().is_none() {
        warn!("Rejected allocation with overflowing cost totals");
        return Err(AppError::InvalidInput(
            "Cost totals are out of range".to_string(),
        ));
    }
    Ok(())
}

/// Per-member cost inputs must be non-negative; team amounts may be signed
pub fn validate_cost_config(config: &PerMemberCostConfig) -> AppResult<()> {
    for (name, value) in [
        ("game_fee_per_game", config.game_fee_per_game),
        ("other_per_person", config.other_per_person),
        ("food_per_person", config.food_per_person),
        ("penalty_amount", config.penalty_amount),
    ] {
        if value < 0 {
            return Err(AppError::InvalidInput(format!(
                "{} must not be negative: {}",
                name, value
            )));
        }
    }
    Ok(())
}
