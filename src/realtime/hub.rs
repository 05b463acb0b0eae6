use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::user::UserId;

use super::chunk::{base_event, chunk_event, into_chunks, Chunk, Reassembler, CHUNK_SIZE};
use super::presence::{Presence, PRESENCE_JOINED, PRESENCE_LEFT};
use super::transport::{Transport, TransportMessage};

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`RealtimeHub::bind`], needed to remove the listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub channel: String,
    pub event: String,
    id: u64,
}

#[derive(Serialize)]
struct PresenceEvent {
    user_id: UserId,
}

struct EventListeners {
    listeners: HashMap<u64, Listener>,
    reassembler: Reassembler,
}

struct ChannelState {
    events: HashMap<String, EventListeners>,
    pump: JoinHandle<()>,
}

struct HubInner {
    transport: Arc<dyn Transport>,
    reassembly_timeout: Duration,
    channels: Mutex<HashMap<String, ChannelState>>,
    presence: Presence,
    next_binding: AtomicU64,
}

/// Publishes and receives JSON events over a [`Transport`], splitting
/// payloads that are too large for it and putting them back together on the
/// receiving side. Each channel holds at most one transport subscription no
/// matter how many listeners are bound to it.
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl RealtimeHub {
    pub fn new(transport: Arc<dyn Transport>, reassembly_timeout: Duration) -> RealtimeHub {
        RealtimeHub {
            inner: Arc::new(HubInner {
                transport,
                reassembly_timeout,
                channels: Mutex::new(HashMap::new()),
                presence: Presence::default(),
                next_binding: AtomicU64::new(0),
            }),
        }
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn publish<T: Serialize>(
        &self,
        channel: &str,
        event: &str,
        payload: &T,
    ) -> Result<(), Error> {
        let payload = serde_json::to_string(payload)?;
        let transport = &self.inner.transport;

        if payload.len() <= CHUNK_SIZE {
            return transport.trigger(channel, event, payload).await;
        }

        let chunks = into_chunks(&payload);
        debug!(size = payload.len(), chunks = chunks.len(), "publishing in fragments");
        let event = chunk_event(event);
        for chunk in chunks {
            let envelope = serde_json::to_string(&chunk)?;
            transport.trigger(channel, &event, envelope).await?;
        }

        Ok(())
    }

    /// Registers `listener` for `event` on `channel`. The first binding on a
    /// channel opens the transport subscription.
    pub async fn bind(
        &self,
        channel: &str,
        event: &str,
        listener: Listener,
    ) -> Result<Binding, Error> {
        let mut channels = self.inner.channels.lock().await;

        if !channels.contains_key(channel) {
            let messages = self.inner.transport.subscribe(channel).await?;
            let pump = tokio::spawn(pump(
                Arc::downgrade(&self.inner),
                channel.to_string(),
                messages,
            ));
            info!(channel, "subscribed to realtime channel");
            channels.insert(
                channel.to_string(),
                ChannelState {
                    events: HashMap::new(),
                    pump,
                },
            );
        }

        let id = self.inner.next_binding.fetch_add(1, Ordering::Relaxed);
        let timeout = self.inner.reassembly_timeout;
        if let Some(state) = channels.get_mut(channel) {
            state
                .events
                .entry(event.to_string())
                .or_insert_with(|| EventListeners {
                    listeners: HashMap::new(),
                    reassembler: Reassembler::new(timeout),
                })
                .listeners
                .insert(id, listener);
        }

        Ok(Binding {
            channel: channel.to_string(),
            event: event.to_string(),
            id,
        })
    }

    /// Removes a listener. The last unbind on a channel closes the transport
    /// subscription.
    pub async fn unbind(&self, binding: &Binding) -> Result<(), Error> {
        let mut channels = self.inner.channels.lock().await;

        let state = match channels.get_mut(&binding.channel) {
            Some(state) => state,
            None => return Ok(()),
        };
        if let Some(event) = state.events.get_mut(&binding.event) {
            event.listeners.remove(&binding.id);
            if event.listeners.is_empty() {
                state.events.remove(&binding.event);
            }
        }

        if state.events.is_empty() {
            if let Some(state) = channels.remove(&binding.channel) {
                state.pump.abort();
            }
            self.inner.transport.unsubscribe(&binding.channel).await?;
            info!(channel = %binding.channel, "unsubscribed from realtime channel");
        }

        Ok(())
    }

    /// Counts a connection for `user_id`, announcing the user on their first.
    pub async fn join(&self, channel: &str, user_id: UserId) -> Result<(), Error> {
        if self.inner.presence.join(channel, user_id)? {
            self.publish(channel, PRESENCE_JOINED, &PresenceEvent { user_id })
                .await?;
        }

        Ok(())
    }

    /// Releases a connection for `user_id`, announcing the departure on their
    /// last.
    pub async fn leave(&self, channel: &str, user_id: UserId) -> Result<(), Error> {
        if self.inner.presence.leave(channel, user_id)? {
            self.publish(channel, PRESENCE_LEFT, &PresenceEvent { user_id })
                .await?;
        }

        Ok(())
    }

    pub fn members(&self, channel: &str) -> Result<Vec<UserId>, Error> {
        self.inner.presence.members(channel)
    }
}

impl HubInner {
    async fn dispatch(&self, channel: &str, message: TransportMessage) {
        let fragmented = base_event(&message.event).map(str::to_string);
        let (event, payload) = match fragmented {
            Some(event) => {
                let chunk: Chunk = match serde_json::from_str(&message.payload) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(channel, event = %message.event, error = %err, "dropping malformed fragment");
                        return;
                    }
                };

                let mut channels = self.channels.lock().await;
                let listeners = match channels
                    .get_mut(channel)
                    .and_then(|state| state.events.get_mut(&event))
                {
                    Some(listeners) => listeners,
                    None => return,
                };
                match listeners.reassembler.accept(chunk, Instant::now()) {
                    Some(payload) => (event, payload),
                    None => return,
                }
            }
            None => (message.event, message.payload),
        };

        let value: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(channel, %event, error = %err, "dropping event that is not valid json");
                return;
            }
        };

        let listeners: Vec<Listener> = {
            let channels = self.channels.lock().await;
            match channels
                .get(channel)
                .and_then(|state| state.events.get(&event))
            {
                Some(listeners) => listeners.listeners.values().cloned().collect(),
                None => return,
            }
        };

        for listener in listeners {
            listener(&value);
        }
    }

    async fn reap(&self, channel: &str) {
        let now = Instant::now();
        let mut channels = self.channels.lock().await;
        if let Some(state) = channels.get_mut(channel) {
            for listeners in state.events.values_mut() {
                listeners.reassembler.reap(now);
            }
        }
    }
}

async fn pump(
    hub: Weak<HubInner>,
    channel: String,
    mut messages: BoxStream<'static, TransportMessage>,
) {
    let period = match hub.upgrade() {
        Some(hub) => hub.reassembly_timeout,
        None => return,
    };
    let mut reaper = tokio::time::interval(period.max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            message = messages.next() => {
                let message = match message {
                    Some(message) => message,
                    None => break,
                };
                match hub.upgrade() {
                    Some(hub) => hub.dispatch(&channel, message).await,
                    None => break,
                }
            }
            _ = reaper.tick() => {
                match hub.upgrade() {
                    Some(hub) => hub.reap(&channel).await,
                    None => break,
                }
            }
        }
    }

    debug!(%channel, "realtime pump stopped");
}
