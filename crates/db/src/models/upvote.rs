use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// `(question_id, user_id)` is unique — the index, not application logic, is
/// what makes the upvote toggle idempotent under racing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upvote {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub question_id: ObjectId,
    pub user_id: ObjectId,
    pub created_at: DateTime,
}

impl Upvote {
    pub const COLLECTION: &'static str = "question_upvotes";
}
