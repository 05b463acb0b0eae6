use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson;
use mongodb::options::FindOptions;

use crate::database::{poisoned, MongoConversationStore, MongoMessageStore};
use crate::error::Error;

use super::{ChatMessage, Conversation, ConversationId};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), Error>;

    async fn fetch_conversation_by_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, Error>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error>;

    /// Oldest first.
    async fn fetch_messages_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ChatMessage>, Error>;
}

#[async_trait]
impl ConversationStore for MongoConversationStore {
    #[tracing::instrument(skip(self))]
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), Error> {
        self.insert_one(conversation, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_conversation_by_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, Error> {
        let conversation = self
            .find_one(bson::doc! { "_id": conversation_id }, None)
            .await?;

        Ok(conversation)
    }
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    #[tracing::instrument(skip(self))]
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error> {
        self.insert_one(message, None).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_messages_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ChatMessage>, Error> {
        let options = FindOptions::builder()
            .sort(bson::doc! { "created_at": 1 })
            .build();
        let messages: Vec<ChatMessage> = self
            .find(bson::doc! { "conversation_id": conversation_id }, options)
            .await?
            .try_collect()
            .await?;

        Ok(messages)
    }
}

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), Error> {
        let mut conversations = self.conversations.lock().map_err(poisoned)?;
        conversations.insert(conversation.id, conversation.clone());

        Ok(())
    }

    async fn fetch_conversation_by_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Conversation>, Error> {
        let conversations = self.conversations.lock().map_err(poisoned)?;

        Ok(conversations.get(&conversation_id).cloned())
    }
}

/// Messages are kept in insertion order, which is also creation order.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), Error> {
        let mut messages = self.messages.lock().map_err(poisoned)?;
        messages.push(message.clone());

        Ok(())
    }

    async fn fetch_messages_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<ChatMessage>, Error> {
        let messages = self.messages.lock().map_err(poisoned)?;

        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}
