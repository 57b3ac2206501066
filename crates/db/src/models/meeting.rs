use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub code: String,
    pub title: String,
    pub host_user_id: ObjectId,
    #[serde(default)]
    pub lobby_enabled: bool,
    #[serde(default)]
    pub status: MeetingStatus,
    pub scheduled_at: Option<DateTime>,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Scheduled,
    Live,
    Ended,
}

impl Meeting {
    pub const COLLECTION: &'static str = "meetings";

    /// Instant meetings have no schedule; only these are eligible for idle GC.
    pub fn is_instant(&self) -> bool {
        self.scheduled_at.is_none()
    }
}
