use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutRoom {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub participant_ids: Vec<ObjectId>,
    #[serde(default = "bool_true")]
    pub is_active: bool,
    pub ends_at: Option<DateTime>,
    pub created_at: DateTime,
}

fn bool_true() -> bool {
    true
}

impl BreakoutRoom {
    pub const COLLECTION: &'static str = "breakout_rooms";
}
