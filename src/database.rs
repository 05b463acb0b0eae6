use mongodb::{bson, Collection, Database as MongoClientDatabase};
use tracing::info;

use crate::campaign::db::{CampaignStore, MemoryCampaignStore};
use crate::campaign::Campaign;
use crate::chat::db::{ConversationStore, MemoryConversationStore, MemoryMessageStore, MessageStore};
use crate::chat::{ChatMessage, Conversation};
use crate::error::Error;
use crate::product::db::{MemoryProductStore, ProductStore};
use crate::product::Product;
use crate::user::db::{MemoryUserStore, UserStore};
use crate::user::User;

pub type MongoCampaignStore = Collection<Campaign>;
pub type MongoProductStore = Collection<Product>;
pub type MongoUserStore = Collection<User>;
pub type MongoConversationStore = Collection<Conversation>;
pub type MongoMessageStore = Collection<ChatMessage>;

const CAMPAIGNS: &str = "launchpads";
const PRODUCTS: &str = "products";
const USERS: &str = "users";
const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";

pub trait Database: Send + Sync {
    fn campaigns(&self) -> &dyn CampaignStore;
    fn products(&self) -> &dyn ProductStore;
    fn users(&self) -> &dyn UserStore;
    fn conversations(&self) -> &dyn ConversationStore;
    fn messages(&self) -> &dyn MessageStore;
}

#[derive(Debug, Clone)]
pub struct MongoDatabase {
    campaigns: MongoCampaignStore,
    products: MongoProductStore,
    users: MongoUserStore,
    conversations: MongoConversationStore,
    messages: MongoMessageStore,
    db: MongoClientDatabase,
}

impl MongoDatabase {
    pub async fn initialize(db: MongoClientDatabase) -> Result<MongoDatabase, Error> {
        // ping the database to ensure connection is established
        db.run_command(bson::doc! { "ping": 1 }, None).await?;

        db.run_command(
            bson::doc! {
                "createIndexes": CAMPAIGNS,
                "indexes": [
                    { "key": { "status": 1, "end_time": 1 }, "name": "by_status_end_time" },
                    { "key": { "tenant_id": 1, "created_at": -1 }, "name": "by_tenant_id" },
                ]
            },
            None,
        )
        .await?;
        db.run_command(
            bson::doc! {
                "createIndexes": PRODUCTS,
                "indexes": [
                    { "key": { "tenant_id": 1, "created_at": -1 }, "name": "by_tenant_id" },
                    { "key": { "source_launchpad": 1 }, "name": "by_source_launchpad" },
                ]
            },
            None,
        )
        .await?;
        db.run_command(
            bson::doc! {
                "createIndexes": MESSAGES,
                "indexes": [
                    { "key": { "conversation_id": 1, "created_at": 1 }, "name": "by_conversation_id" },
                ]
            },
            None,
        )
        .await?;
        info!("database indexes are in place");

        Ok(MongoDatabase {
            campaigns: db.collection(CAMPAIGNS),
            products: db.collection(PRODUCTS),
            users: db.collection(USERS),
            conversations: db.collection(CONVERSATIONS),
            messages: db.collection(MESSAGES),
            db,
        })
    }

    pub async fn drop(&self) -> Result<(), Error> {
        self.db.drop(None).await?;

        Ok(())
    }
}

impl Database for MongoDatabase {
    fn campaigns(&self) -> &dyn CampaignStore {
        &self.campaigns
    }

    fn products(&self) -> &dyn ProductStore {
        &self.products
    }

    fn users(&self) -> &dyn UserStore {
        &self.users
    }

    fn conversations(&self) -> &dyn ConversationStore {
        &self.conversations
    }

    fn messages(&self) -> &dyn MessageStore {
        &self.messages
    }
}

/// A process-local database for development runs and tests.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    campaigns: MemoryCampaignStore,
    products: MemoryProductStore,
    users: MemoryUserStore,
    conversations: MemoryConversationStore,
    messages: MemoryMessageStore,
}

impl MemoryDatabase {
    pub fn new() -> MemoryDatabase {
        MemoryDatabase::default()
    }
}

impl Database for MemoryDatabase {
    fn campaigns(&self) -> &dyn CampaignStore {
        &self.campaigns
    }

    fn products(&self) -> &dyn ProductStore {
        &self.products
    }

    fn users(&self) -> &dyn UserStore {
        &self.users
    }

    fn conversations(&self) -> &dyn ConversationStore {
        &self.conversations
    }

    fn messages(&self) -> &dyn MessageStore {
        &self.messages
    }
}

pub(crate) fn poisoned<T>(_: T) -> Error {
    Error::ExistentialState("in-memory store lock was poisoned".into())
}
