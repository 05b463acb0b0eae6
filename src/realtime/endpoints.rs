use std::sync::Arc;

use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::{Bytes, Data, Json, Path};
use actix_web::{get, HttpResponse};
use futures::channel::mpsc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::chat::manager::{assert_participant, conversation_for_channel, expect_conversation_by_id};
use crate::database::Database;
use crate::error::Error;
use crate::user::{Identity, UserId};

use super::hub::{Binding, Listener, RealtimeHub};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceBody {
    pub channel: String,
    pub members: Vec<UserId>,
}

/// Conversation channels are open to their participants, everything else to
/// platform admins only.
pub async fn assert_channel_access(
    db: &dyn Database,
    identity: &Identity,
    channel: &str,
) -> Result<(), Error> {
    match conversation_for_channel(channel) {
        Some(conversation_id) => {
            let conversation = expect_conversation_by_id(db, conversation_id).await?;
            assert_participant(identity, &conversation)
        }
        None if identity.is_admin => Ok(()),
        None => Err(Error::ChannelAccessDenied {
            channel: channel.to_string(),
        }),
    }
}

/// Releases the hub binding and the presence slot once the client goes away.
struct Connection {
    hub: RealtimeHub,
    binding: Binding,
    user_id: UserId,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let binding = self.binding.clone();
        let user_id = self.user_id;

        actix_web::rt::spawn(async move {
            if let Err(err) = hub.unbind(&binding).await {
                warn!(channel = %binding.channel, error = %err, "failed to unbind realtime listener");
            }
            if let Err(err) = hub.leave(&binding.channel, user_id).await {
                warn!(channel = %binding.channel, error = %err, "failed to announce departure");
            }
            debug!(channel = %binding.channel, %user_id, "realtime client disconnected");
        });
    }
}

fn sse_frame(value: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", value))
}

#[get("/realtime/{channel}/presence")]
#[tracing::instrument(skip(db, hub))]
pub async fn get_presence(
    db: Data<dyn Database>,
    hub: Data<RealtimeHub>,
    identity: Identity,
    params: Path<String>,
) -> Result<Json<PresenceBody>, Error> {
    let channel = params.into_inner();
    assert_channel_access(&**db, &identity, &channel).await?;

    let members = hub.members(&channel)?;

    Ok(Json(PresenceBody { channel, members }))
}

#[get("/realtime/{channel}/{event}")]
#[tracing::instrument(skip(db, hub))]
pub async fn stream_events(
    db: Data<dyn Database>,
    hub: Data<RealtimeHub>,
    identity: Identity,
    params: Path<(String, String)>,
) -> Result<HttpResponse, Error> {
    let (channel, event) = params.into_inner();
    assert_channel_access(&**db, &identity, &channel).await?;

    let (tx, rx) = mpsc::unbounded::<Value>();
    let listener: Listener = Arc::new(move |value: &Value| {
        let _ = tx.unbounded_send(value.clone());
    });
    let binding = hub.bind(&channel, &event, listener).await?;
    if let Err(err) = hub.join(&channel, identity.user_id).await {
        warn!(%channel, error = %err, "failed to announce arrival");
    }

    let connection = Connection {
        hub: hub.get_ref().clone(),
        binding,
        user_id: identity.user_id,
    };
    let frames = rx.map(move |value| {
        let _connection = &connection;
        Ok::<_, Error>(sse_frame(&value))
    });

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(frames))
}
