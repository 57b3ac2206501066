use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Stable identity. Rows are created by the (out-of-scope) registration flow;
/// this crate only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}
