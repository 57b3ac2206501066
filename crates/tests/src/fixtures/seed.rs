use bson::oid::ObjectId;
use meetsfu_db::models::meeting::Meeting;
use meetsfu_db::models::participant::{Participant, ParticipantRole, ParticipantStatus};
use meetsfu_db::models::user::User;
use meetsfu_services::dao::{MeetingDao, ParticipantDao, UserDao};

use super::test_app::TestApp;

pub struct SeededUser {
    pub id: ObjectId,
    pub email: String,
    pub display_name: String,
    pub token: String,
}

pub struct SeededMeeting {
    pub id: ObjectId,
    pub code: String,
    pub host: SeededUser,
}

impl TestApp {
    /// Inserts a `User` row directly (registration itself is out of scope)
    /// and mints a bearer token for it.
    pub async fn seed_user(&self, email: &str, display_name: &str) -> SeededUser {
        let dao = UserDao::new(&self.db);
        let now = bson::DateTime::now();
        let user = User {
            id: None,
            email: email.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let id = dao.base.insert_one(&user).await.expect("failed to insert user");
        let token = self.mint_token(&id.to_hex(), email, display_name);

        SeededUser {
            id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            token,
        }
    }

    /// Seeds a meeting with a host user and, optionally, a lobby.
    pub async fn seed_meeting(&self, title: &str, lobby_enabled: bool) -> SeededMeeting {
        let host = self.seed_user(&format!("{title}-host@test.local"), "Host").await;

        let meetings = MeetingDao::new(&self.db);
        let meeting: Meeting = meetings
            .create(title.to_string(), host.id, lobby_enabled, None)
            .await
            .expect("failed to insert meeting");

        let participants = ParticipantDao::new(&self.db);
        participants
            .create(
                meeting.id.unwrap(),
                host.id,
                host.display_name.clone(),
                ParticipantRole::Host,
                ParticipantStatus::InMeeting,
            )
            .await
            .expect("failed to insert host participant");

        SeededMeeting {
            id: meeting.id.unwrap(),
            code: meeting.code,
            host,
        }
    }

    /// Seeds an extra participant row for an existing meeting (not yet
    /// connected over the socket).
    pub async fn seed_participant(
        &self,
        meeting_id: ObjectId,
        user: &SeededUser,
        role: ParticipantRole,
        status: ParticipantStatus,
    ) -> Participant {
        let participants = ParticipantDao::new(&self.db);
        participants
            .create(meeting_id, user.id, user.display_name.clone(), role, status)
            .await
            .expect("failed to insert participant")
    }
}
