use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::upvote::Upvote;

use super::base::{BaseDao, DaoError, DaoResult};
use super::question::QuestionDao;

pub struct UpvoteDao {
    pub base: BaseDao<Upvote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleResult {
    Added,
    Removed,
}

impl UpvoteDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Upvote::COLLECTION),
        }
    }

    /// Toggles a user's upvote on a question. The unique `(question_id,
    /// user_id)` index is what makes this idempotent under racing requests —
    /// a duplicate insert attempt is read back as "already upvoted" and
    /// becomes a removal instead.
    pub async fn toggle(
        &self,
        questions: &QuestionDao,
        question_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<ToggleResult> {
        let row = Upvote {
            id: None,
            question_id,
            user_id,
            created_at: DateTime::now(),
        };

        match self.base.insert_one(&row).await {
            Ok(_) => {
                questions.increment_upvote_count(question_id, 1).await?;
                Ok(ToggleResult::Added)
            }
            Err(DaoError::DuplicateKey(_)) => {
                self.base
                    .hard_delete(doc! { "question_id": question_id, "user_id": user_id })
                    .await?;
                questions.increment_upvote_count(question_id, -1).await?;
                Ok(ToggleResult::Removed)
            }
            Err(other) => Err(other),
        }
    }
}
