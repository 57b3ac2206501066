use bson::{doc, oid::ObjectId};
use mongodb::Database;
use meetsfu_db::models::breakout_room::BreakoutRoom;

use super::base::{BaseDao, DaoResult};

pub struct BreakoutRoomDao {
    pub base: BaseDao<BreakoutRoom>,
}

impl BreakoutRoomDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, BreakoutRoom::COLLECTION),
        }
    }

    pub async fn list_active_for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<BreakoutRoom>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id, "is_active": true },
                None,
            )
            .await
    }
}
