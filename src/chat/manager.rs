use chrono::Utc;
use tracing::{info, warn};

use crate::database::Database;
use crate::error::Error;
use crate::realtime::RealtimeHub;
use crate::tenant::TenantId;
use crate::user::Identity;

use super::endpoints::MessageBody;
use super::{ChatMessage, Conversation, ConversationId, MessageId};

const CHANNEL_PREFIX: &str = "conversation-";
pub const MESSAGE_EVENT: &str = "message";

pub fn channel_name(conversation_id: ConversationId) -> String {
    format!("{}{}", CHANNEL_PREFIX, conversation_id)
}

/// The conversation a realtime channel belongs to, if any.
pub fn conversation_for_channel(channel: &str) -> Option<ConversationId> {
    channel.strip_prefix(CHANNEL_PREFIX)?.parse().ok()
}

pub fn assert_participant(identity: &Identity, conversation: &Conversation) -> Result<(), Error> {
    if identity.user_id == conversation.customer_id || identity.can_act_for(conversation.tenant_id)
    {
        return Ok(());
    }

    Err(Error::NotConversationParticipant {
        conversation_id: conversation.id,
    })
}

#[tracing::instrument(skip(db))]
pub async fn create_conversation(
    db: &dyn Database,
    identity: &Identity,
    tenant_id: TenantId,
) -> Result<Conversation, Error> {
    let now = Utc::now();
    let conversation = Conversation {
        id: ConversationId::new(),
        tenant_id,
        customer_id: identity.user_id,
        created_at: now,
        modified_at: now,
    };

    db.conversations().insert_conversation(&conversation).await?;
    info!(conversation_id = %conversation.id, "opened conversation");

    Ok(conversation)
}

#[tracing::instrument(skip(db))]
pub async fn expect_conversation_by_id(
    db: &dyn Database,
    conversation_id: ConversationId,
) -> Result<Conversation, Error> {
    db.conversations()
        .fetch_conversation_by_id(conversation_id)
        .await?
        .ok_or(Error::ConversationNotFound { conversation_id })
}

#[tracing::instrument(skip(db))]
pub async fn get_messages(
    db: &dyn Database,
    identity: &Identity,
    conversation: &Conversation,
) -> Result<Vec<ChatMessage>, Error> {
    assert_participant(identity, conversation)?;

    let messages = db
        .messages()
        .fetch_messages_by_conversation(conversation.id)
        .await?;

    Ok(messages)
}

/// Stores the message, then pushes it to anyone listening on the
/// conversation channel. The message is kept even if the push fails.
#[tracing::instrument(skip(db, hub))]
pub async fn post_message(
    db: &dyn Database,
    hub: &RealtimeHub,
    identity: &Identity,
    conversation: &Conversation,
    body: String,
) -> Result<ChatMessage, Error> {
    assert_participant(identity, conversation)?;
    if body.trim().is_empty() {
        return Err(Error::MissingRequiredField { field: "body" });
    }

    let message = ChatMessage {
        id: MessageId::new(),
        conversation_id: conversation.id,
        sender_id: identity.user_id,
        body,
        created_at: Utc::now(),
    };
    db.messages().insert_message(&message).await?;

    let channel = channel_name(conversation.id);
    let payload = MessageBody::render(message.clone());
    if let Err(err) = hub.publish(&channel, MESSAGE_EVENT, &payload).await {
        warn!(message_id = %message.id, error = %err, "failed to publish chat message");
    }

    Ok(message)
}
