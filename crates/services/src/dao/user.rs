use bson::{doc, oid::ObjectId};
use mongodb::Database;
use meetsfu_db::models::user::User;

use super::base::{BaseDao, DaoError, DaoResult};

/// Read-only from this service's perspective — rows are created by the
/// (out-of-scope) registration flow.
pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<User> {
        self.base.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> DaoResult<User> {
        self.base
            .find_one(doc! { "email": email })
            .await?
            .ok_or(DaoError::NotFound)
    }
}
