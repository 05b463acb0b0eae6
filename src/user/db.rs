use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson;

use crate::database::{poisoned, MongoUserStore};
use crate::error::Error;

use super::{User, UserId};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), Error>;

    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error>;
}

#[async_trait]
impl UserStore for MongoUserStore {
    #[tracing::instrument(skip(self))]
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        self.insert_one(user, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error> {
        let user = self.find_one(bson::doc! { "_id": user_id }, None).await?;

        Ok(user)
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<UserId, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        let mut users = self.users.lock().map_err(poisoned)?;
        users.insert(user.id, user.clone());

        Ok(())
    }

    async fn fetch_user_by_id(&self, user_id: UserId) -> Result<Option<User>, Error> {
        let users = self.users.lock().map_err(poisoned)?;

        Ok(users.get(&user_id).cloned())
    }
}
