use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::invitation::Invitation;

use super::base::{BaseDao, DaoResult};

pub struct InvitationDao {
    pub base: BaseDao<Invitation>,
}

impl InvitationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Invitation::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        meeting_id: ObjectId,
        invited_by_user_id: ObjectId,
        email: String,
    ) -> DaoResult<Invitation> {
        let invitation = Invitation {
            id: None,
            meeting_id,
            invited_by_user_id,
            email,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&invitation).await?;
        self.base.find_by_id(id).await
    }

    pub async fn list_for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<Invitation>> {
        self.base
            .find_many(doc! { "meeting_id": meeting_id }, None)
            .await
    }
}
