use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub reminder_type: ReminderType,
    pub trigger_at: DateTime,
    #[serde(default)]
    pub sent: bool,
    pub target_email: Option<String>,
    pub minutes_before: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Email,
    InApp,
}

impl Reminder {
    pub const COLLECTION: &'static str = "reminders";
}
