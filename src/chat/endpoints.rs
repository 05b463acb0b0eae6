use actix_web::web::{Data, Json, Path};
use actix_web::{get, post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::Error;
use crate::realtime::RealtimeHub;
use crate::tenant::TenantId;
use crate::user::{Identity, UserId};

use super::{manager, ChatMessage, Conversation, ConversationId, MessageId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateConversationBody {
    pub tenant_id: TenantId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostMessageBody {
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationBody {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub customer_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl ConversationBody {
    pub fn render(conversation: Conversation) -> ConversationBody {
        ConversationBody {
            id: conversation.id,
            tenant_id: conversation.tenant_id,
            customer_id: conversation.customer_id,
            created_at: conversation.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl MessageBody {
    pub fn render(message: ChatMessage) -> MessageBody {
        MessageBody {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            body: message.body,
            created_at: message.created_at,
        }
    }
}

#[post("/conversations")]
#[tracing::instrument(skip(db))]
pub async fn create_conversation(
    db: Data<dyn Database>,
    identity: Identity,
    body: Json<CreateConversationBody>,
) -> Result<Json<ConversationBody>, Error> {
    let conversation = manager::create_conversation(&**db, &identity, body.tenant_id).await?;

    Ok(Json(ConversationBody::render(conversation)))
}

#[get("/conversations/{conversation_id}/messages")]
#[tracing::instrument(skip(db))]
pub async fn get_messages(
    db: Data<dyn Database>,
    identity: Identity,
    params: Path<ConversationId>,
) -> Result<Json<Vec<MessageBody>>, Error> {
    let conversation_id = params.into_inner();
    let conversation = manager::expect_conversation_by_id(&**db, conversation_id).await?;

    let messages = manager::get_messages(&**db, &identity, &conversation).await?;

    let body = messages.into_iter().map(MessageBody::render).collect();

    Ok(Json(body))
}

#[post("/conversations/{conversation_id}/messages")]
#[tracing::instrument(skip(db, hub))]
pub async fn post_message(
    db: Data<dyn Database>,
    hub: Data<RealtimeHub>,
    identity: Identity,
    params: Path<ConversationId>,
    body: Json<PostMessageBody>,
) -> Result<Json<MessageBody>, Error> {
    let conversation_id = params.into_inner();
    let conversation = manager::expect_conversation_by_id(&**db, conversation_id).await?;

    let message =
        manager::post_message(&**db, &hub, &identity, &conversation, body.into_inner().body)
            .await?;

    Ok(Json(MessageBody::render(message)))
}
