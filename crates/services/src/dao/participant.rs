use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::participant::{Participant, ParticipantRole, ParticipantStatus};

use super::base::{BaseDao, DaoResult};

pub struct ParticipantDao {
    pub base: BaseDao<Participant>,
}

impl ParticipantDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Participant::COLLECTION),
        }
    }

    pub async fn find_by_meeting_and_user(
        &self,
        meeting_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Option<Participant>> {
        self.base
            .find_one(doc! { "meeting_id": meeting_id, "user_id": user_id })
            .await
    }

    /// Creates the durable `(meetingId, userId)` row the first time a user
    /// joins a meeting. The unique index on `(meeting_id, user_id)` is what
    /// makes a racing double-join resolve to a single row.
    pub async fn create(
        &self,
        meeting_id: ObjectId,
        user_id: ObjectId,
        display_name: String,
        role: ParticipantRole,
        status: ParticipantStatus,
    ) -> DaoResult<Participant> {
        let participant = Participant {
            id: None,
            meeting_id,
            user_id,
            display_name,
            role,
            status,
            breakout_room_id: None,
            is_muted: false,
            is_video_on: true,
            is_screen_sharing: false,
            is_hand_raised: false,
            joined_at: DateTime::now(),
            left_at: None,
        };
        let id = self.base.insert_one(&participant).await?;
        self.base.find_by_id(id).await
    }

    /// Marks a reconnect: clears `leftAt` and reinstates whatever status the
    /// caller has already decided on (see `AdmissionService::join_status`).
    pub async fn mark_rejoined(
        &self,
        participant_id: ObjectId,
        status: ParticipantStatus,
    ) -> DaoResult<bool> {
        self.base
            .update_by_id(
                participant_id,
                doc! { "$set": {
                    "status": status_to_str(status),
                    "left_at": bson::Bson::Null,
                } },
            )
            .await
    }

    pub async fn mark_left(&self, participant_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_by_id(
                participant_id,
                doc! { "$set": { "left_at": DateTime::now() } },
            )
            .await
    }

    pub async fn list_active_for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<Participant>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id, "status": { "$ne": "removed" } },
                Some(doc! { "joined_at": 1 }),
            )
            .await
    }

    pub async fn list_in_lobby(&self, meeting_id: ObjectId) -> DaoResult<Vec<Participant>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id, "status": "in_lobby" },
                Some(doc! { "joined_at": 1 }),
            )
            .await
    }
}

fn status_to_str(status: ParticipantStatus) -> &'static str {
    match status {
        ParticipantStatus::InLobby => "in_lobby",
        ParticipantStatus::InMeeting => "in_meeting",
        ParticipantStatus::InBreakout => "in_breakout",
        ParticipantStatus::Removed => "removed",
    }
}
