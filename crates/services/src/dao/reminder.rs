use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::reminder::{Reminder, ReminderType};

use super::base::{BaseDao, DaoResult};

pub struct ReminderDao {
    pub base: BaseDao<Reminder>,
}

impl ReminderDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Reminder::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        meeting_id: ObjectId,
        reminder_type: ReminderType,
        trigger_at: DateTime,
        target_email: Option<String>,
        minutes_before: u32,
    ) -> DaoResult<Reminder> {
        let reminder = Reminder {
            id: None,
            meeting_id,
            reminder_type,
            trigger_at,
            sent: false,
            target_email,
            minutes_before,
        };
        let id = self.base.insert_one(&reminder).await?;
        self.base.find_by_id(id).await
    }
}
