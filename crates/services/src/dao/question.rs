use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use meetsfu_db::models::question::Question;

use super::base::{BaseDao, DaoResult};

pub struct QuestionDao {
    pub base: BaseDao<Question>,
}

impl QuestionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Question::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        meeting_id: ObjectId,
        author_id: ObjectId,
        content: String,
    ) -> DaoResult<Question> {
        let question = Question {
            id: None,
            meeting_id,
            author_id,
            content,
            answered: false,
            pinned: false,
            upvote_count: 0,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&question).await?;
        self.base.find_by_id(id).await
    }

    pub async fn list_for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<Question>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id },
                Some(doc! { "created_at": 1 }),
            )
            .await
    }

    pub async fn toggle_answered(&self, question_id: ObjectId) -> DaoResult<Question> {
        let question = self.base.find_by_id(question_id).await?;
        self.base
            .update_by_id(
                question_id,
                doc! { "$set": { "answered": !question.answered } },
            )
            .await?;
        self.base.find_by_id(question_id).await
    }

    pub async fn toggle_pinned(&self, question_id: ObjectId) -> DaoResult<Question> {
        let question = self.base.find_by_id(question_id).await?;
        self.base
            .update_by_id(
                question_id,
                doc! { "$set": { "pinned": !question.pinned } },
            )
            .await?;
        self.base.find_by_id(question_id).await
    }

    pub async fn increment_upvote_count(&self, question_id: ObjectId, delta: i32) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": question_id },
                doc! { "$inc": { "upvote_count": delta } },
            )
            .await
    }
}
