//! Member and meeting directory lookups
//!
//! Members and meetings are maintained elsewhere in the club system; these
//! repositories only read the columns the settlement code needs.

use async_trait::async_trait;
use chrono::NaiveDate;
use clubpay_core::{
    models::{Meeting, MeetingId, MemberId},
    traits::{MeetingDirectory, MemberDirectory},
    AppError, AppResult,
};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, error, instrument};

/// PostgreSQL-backed member names
pub struct PgMemberDirectory {
    pool: PgPool,
}

impl PgMemberDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberDirectory for PgMemberDirectory {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_names(&self, ids: &[MemberId]) -> AppResult<HashMap<MemberId, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM members WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error fetching member names: {}", e);
                    AppError::Database(format!("Failed to fetch member names: {}", e))
                })?;

        debug!("Resolved {} of {} member names", rows.len(), ids.len());
        Ok(rows.into_iter().collect())
    }
}

/// PostgreSQL-backed meeting details
pub struct PgMeetingDirectory {
    pool: PgPool,
}

impl PgMeetingDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MeetingDirectory for PgMeetingDirectory {
    #[instrument(skip(self))]
    async fn find_meeting(&self, id: MeetingId) -> AppResult<Option<Meeting>> {
        let row: Option<(i64, NaiveDate, Option<String>)> =
            sqlx::query_as("SELECT id, meeting_date, location FROM meetings WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error finding meeting {}: {}", id, e);
                    AppError::Database(format!("Failed to find meeting: {}", e))
                })?;

        Ok(row.map(|(id, date, location)| Meeting { id, date, location }))
    }
}
