use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::chat_message::ChatMessage;

use super::base::{BaseDao, DaoResult};

pub struct ChatMessageDao {
    pub base: BaseDao<ChatMessage>,
}

impl ChatMessageDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, ChatMessage::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        meeting_id: ObjectId,
        author_id: ObjectId,
        content: String,
    ) -> DaoResult<ChatMessage> {
        let message = ChatMessage {
            id: None,
            meeting_id,
            author_id,
            content,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&message).await?;
        self.base.find_by_id(id).await
    }

    /// Last 100 messages, ascending by `createdAt`, per the chat history
    /// contract.
    pub async fn recent_history(&self, meeting_id: ObjectId) -> DaoResult<Vec<ChatMessage>> {
        let mut latest = self
            .base
            .find_many(
                doc! { "meeting_id": meeting_id },
                Some(doc! { "created_at": -1 }),
            )
            .await?;
        latest.truncate(100);
        latest.reverse();
        Ok(latest)
    }
}
