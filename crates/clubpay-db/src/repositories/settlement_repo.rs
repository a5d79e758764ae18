//! Settlement repository implementation
//!
//! PostgreSQL-backed storage for settlements and their member rows. A
//! settlement and its rows are written in one transaction; member rows go
//! away with their settlement through `ON DELETE CASCADE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clubpay_core::{
    models::{
        MeetingId, MemberId, NewSettlement, Settlement, SettlementId, SettlementMember,
        SettlementMemberDraft, SettlementStatus,
    },
    traits::SettlementRepository,
    AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

const SETTLEMENT_COLUMNS: &str = r#"
    id, meeting_id, game_fee, food_fee, other_fee,
    total_amount, per_person, memo, status, created_at
"#;

/// PostgreSQL implementation of SettlementRepository
pub struct PgSettlementRepository {
    pool: PgPool,
}

impl PgSettlementRepository {
    /// Create a new settlement repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse settlement status from string
    fn parse_status(s: &str) -> AppResult<SettlementStatus> {
        SettlementStatus::from_str(s).ok_or_else(|| {
            error!("Unknown settlement status '{}' in database", s);
            AppError::Database(format!("Unknown settlement status '{}'", s))
        })
    }
}

#[async_trait]
impl SettlementRepository for PgSettlementRepository {
    #[instrument(
        skip(self, settlement, members),
        fields(meeting_id = settlement.meeting_id, members = members.len())
    )]
    async fn create_with_members(
        &self,
        settlement: NewSettlement,
        members: Vec<SettlementMemberDraft>,
    ) -> AppResult<Settlement> {
        debug!("Creating settlement for meeting {}", settlement.meeting_id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = sqlx::query_as::<sqlx::Postgres, SettlementRow>(&format!(
            r#"
            INSERT INTO settlements (
                meeting_id, game_fee, food_fee, other_fee,
                total_amount, per_person, memo, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SETTLEMENT_COLUMNS
        ))
        .bind(settlement.meeting_id)
        .bind(settlement.totals.game_fee)
        .bind(settlement.totals.food_fee)
        .bind(settlement.totals.other_fee)
        .bind(settlement.total_amount())
        .bind(settlement.per_person)
        .bind(&settlement.memo)
        .bind(SettlementStatus::Pending.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating settlement: {}", e);
            AppError::Database(format!("Failed to create settlement: {}", e))
        })?;

        for (position, member) in members.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO settlement_members (
                    settlement_id, member_id, position, amount,
                    exclude_food, exclude_game, has_penalty, is_discounted, is_paid
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(row.id)
            .bind(member.member_id)
            .bind(position as i32)
            .bind(member.amount)
            .bind(member.exclude_food)
            .bind(member.exclude_game)
            .bind(member.has_penalty)
            .bind(member.is_discounted)
            .bind(member.is_paid)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Dropping the transaction rolls back the settlement row too
                error!(
                    "Failed to insert member {} for settlement {}: {}",
                    member.member_id, row.id, e
                );
                AppError::Database(format!("Failed to create settlement member: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Settlement::try_from(row)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: SettlementId) -> AppResult<Option<Settlement>> {
        debug!("Finding settlement by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, SettlementRow>(&format!(
            "SELECT {} FROM settlements WHERE id = $1",
            SETTLEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding settlement {}: {}", id, e);
            AppError::Database(format!("Failed to find settlement: {}", e))
        })?;

        result.map(Settlement::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_latest_by_meeting(&self, meeting_id: MeetingId) -> AppResult<Option<Settlement>> {
        debug!("Finding latest settlement for meeting: {}", meeting_id);

        let result = sqlx::query_as::<sqlx::Postgres, SettlementRow>(&format!(
            r#"
            SELECT {}
            FROM settlements
            WHERE meeting_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            SETTLEMENT_COLUMNS
        ))
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding settlement for meeting {}: {}", meeting_id, e);
            AppError::Database(format!("Failed to find settlement: {}", e))
        })?;

        result.map(Settlement::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: i64, offset: i64) -> AppResult<(Vec<Settlement>, i64)> {
        debug!("Listing settlements with limit {} offset {}", limit, offset);

        let rows = sqlx::query_as::<sqlx::Postgres, SettlementRow>(&format!(
            r#"
            SELECT {}
            FROM settlements
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
            SETTLEMENT_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing settlements: {}", e);
            AppError::Database(format!("Failed to fetch settlements: {}", e))
        })?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settlements")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting settlements: {}", e);
                AppError::Database(format!("Failed to count settlements: {}", e))
            })?;

        let settlements = rows
            .into_iter()
            .map(Settlement::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((settlements, total.0))
    }

    #[instrument(skip(self))]
    async fn find_members(&self, settlement_id: SettlementId) -> AppResult<Vec<SettlementMember>> {
        let rows = sqlx::query_as::<sqlx::Postgres, SettlementMemberRow>(
            r#"
            SELECT
                settlement_id, member_id, amount,
                exclude_food, exclude_game, has_penalty, is_discounted, is_paid
            FROM settlement_members
            WHERE settlement_id = $1
            ORDER BY position
            "#,
        )
        .bind(settlement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error fetching members of settlement {}: {}",
                settlement_id, e
            );
            AppError::Database(format!("Failed to fetch settlement members: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn set_member_paid(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        is_paid: bool,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE settlement_members
            SET is_paid = $3
            WHERE settlement_id = $1 AND member_id = $2
            "#,
        )
        .bind(settlement_id)
        .bind(member_id)
        .bind(is_paid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating payment flag: {}", e);
            AppError::Database(format!("Failed to update payment: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn update_member_amount(
        &self,
        settlement_id: SettlementId,
        member_id: MemberId,
        amount: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE settlement_members
            SET amount = $3
            WHERE settlement_id = $1 AND member_id = $2
            "#,
        )
        .bind(settlement_id)
        .bind(member_id)
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating member amount: {}", e);
            AppError::Database(format!("Failed to update member amount: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: SettlementId, status: SettlementStatus) -> AppResult<bool> {
        let result = sqlx::query("UPDATE settlements SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating settlement {} status: {}", id, e);
                AppError::Database(format!("Failed to update settlement status: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: SettlementId) -> AppResult<bool> {
        debug!("Deleting settlement: {}", id);

        let result = sqlx::query("DELETE FROM settlements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting settlement {}: {}", id, e);
                AppError::Database(format!("Failed to delete settlement: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping settlement rows
#[derive(Debug, sqlx::FromRow)]
struct SettlementRow {
    id: i64,
    meeting_id: i64,
    game_fee: i64,
    food_fee: i64,
    other_fee: i64,
    total_amount: i64,
    per_person: i64,
    memo: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SettlementRow> for Settlement {
    type Error = AppError;

    fn try_from(row: SettlementRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            meeting_id: row.meeting_id,
            game_fee: row.game_fee,
            food_fee: row.food_fee,
            other_fee: row.other_fee,
            total_amount: row.total_amount,
            per_person: row.per_person,
            memo: row.memo,
            status: PgSettlementRepository::parse_status(&row.status)?,
            created_at: row.created_at,
        })
    }
}

/// Helper struct for mapping member rows
#[derive(Debug, sqlx::FromRow)]
struct SettlementMemberRow {
    settlement_id: i64,
    member_id: i64,
    amount: i64,
    exclude_food: bool,
    exclude_game: bool,
    has_penalty: bool,
    is_discounted: bool,
    is_paid: bool,
}

impl From<SettlementMemberRow> for SettlementMember {
    fn from(row: SettlementMemberRow) -> Self {
        Self {
            settlement_id: row.settlement_id,
            member_id: row.member_id,
            amount: row.amount,
            exclude_food: row.exclude_food,
            exclude_game: row.exclude_game,
            has_penalty: row.has_penalty,
            is_discounted: row.is_discounted,
            is_paid: row.is_paid,
        }
    }
}
