//! Read-only views of entities owned by other parts of the club system

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::settlement::MeetingId;

/// Meeting details shown in the billing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub date: NaiveDate,
    pub location: Option<String>,
}
