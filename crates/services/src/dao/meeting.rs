use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use rand::Rng;
use meetsfu_db::models::meeting::{Meeting, MeetingStatus};

use super::base::{BaseDao, DaoError, DaoResult};

pub struct MeetingDao {
    pub base: BaseDao<Meeting>,
}

impl MeetingDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Meeting::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        title: String,
        host_user_id: ObjectId,
        lobby_enabled: bool,
        scheduled_at: Option<DateTime>,
    ) -> DaoResult<Meeting> {
        let now = DateTime::now();
        let meeting = Meeting {
            id: None,
            code: generate_meeting_code(),
            title,
            host_user_id,
            lobby_enabled,
            status: MeetingStatus::Scheduled,
            scheduled_at,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };

        let id = self.base.insert_one(&meeting).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_by_code(&self, code: &str) -> DaoResult<Meeting> {
        self.base
            .find_one(doc! { "code": code })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn mark_live(&self, meeting_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_by_id(
                meeting_id,
                doc! { "$set": { "status": "live", "started_at": DateTime::now() } },
            )
            .await
    }

    pub async fn mark_ended(&self, meeting_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_by_id(
                meeting_id,
                doc! { "$set": { "status": "ended", "ended_at": DateTime::now() } },
            )
            .await
    }
}

/// Three lowercase letters, hyphen, four, hyphen, three — e.g. `abc-defg-hij`.
fn generate_meeting_code() -> String {
    let mut rng = rand::rng();
    let group = |rng: &mut rand::rngs::ThreadRng, len: usize| -> String {
        (0..len)
            .map(|_| (b'a' + rng.random_range(0..26u8)) as char)
            .collect()
    };
    format!(
        "{}-{}-{}",
        group(&mut rng, 3),
        group(&mut rng, 4),
        group(&mut rng, 3)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_code_matches_expected_shape() {
        let code = generate_meeting_code();
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 3);
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 3);
        assert!(code.chars().all(|c| c == '-' || c.is_ascii_lowercase()));
    }
}
