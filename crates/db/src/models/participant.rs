use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Durable `(meeting_id, user_id)` row — unique, enforced via an index.
/// This is the authoritative state; in-memory Room/Peer state is a cache of
/// the live subset of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub user_id: ObjectId,
    pub display_name: String,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub status: ParticipantStatus,
    pub breakout_room_id: Option<ObjectId>,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_video_on: bool,
    #[serde(default)]
    pub is_screen_sharing: bool,
    #[serde(default)]
    pub is_hand_raised: bool,
    pub joined_at: DateTime,
    pub left_at: Option<DateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Host,
    CoHost,
    #[default]
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    InLobby,
    InMeeting,
    InBreakout,
    Removed,
}

impl Participant {
    pub const COLLECTION: &'static str = "meeting_participants";
}
