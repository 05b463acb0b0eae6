use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;
use crate::typedid::{TypedId, TypedIdMarker};
use crate::user::UserId;

pub mod db;
pub mod endpoints;
pub mod manager;
pub use endpoints::*;

pub type ConversationId = TypedId<Conversation>;
pub type MessageId = TypedId<ChatMessage>;

/// A thread between one customer and the members of a tenant.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub customer_id: UserId,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

impl TypedIdMarker for Conversation {
    fn tag() -> &'static str {
        "CNV"
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl TypedIdMarker for ChatMessage {
    fn tag() -> &'static str {
        "MSG"
    }
}
