use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub invited_by_user_id: ObjectId,
    pub email: String,
    pub created_at: DateTime,
}

impl Invitation {
    pub const COLLECTION: &'static str = "invitations";
}
