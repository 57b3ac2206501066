use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub author_id: ObjectId,
    pub content: String,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub upvote_count: u32,
    pub created_at: DateTime,
}

impl Question {
    pub const COLLECTION: &'static str = "questions";
}
