use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::database::poisoned;
use crate::error::Error;

use super::chunk::MAX_TRANSPORT_PAYLOAD;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportMessage {
    pub event: String,
    pub payload: String,
}

/// A pub/sub broker that moves named events over named channels.
///
/// Implementations may refuse payloads above [`MAX_TRANSPORT_PAYLOAD`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn trigger(&self, channel: &str, event: &str, payload: String) -> Result<(), Error>;

    async fn subscribe(&self, channel: &str)
        -> Result<BoxStream<'static, TransportMessage>, Error>;

    async fn unsubscribe(&self, channel: &str) -> Result<(), Error>;
}

/// An in-process broker for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct LocalTransport {
    channels: Mutex<HashMap<String, broadcast::Sender<TransportMessage>>>,
    subscriptions: Mutex<HashMap<String, usize>>,
}

impl LocalTransport {
    pub fn new() -> LocalTransport {
        LocalTransport::default()
    }

    /// Number of live subscriptions held on `channel`.
    pub fn subscriptions(&self, channel: &str) -> Result<usize, Error> {
        let subscriptions = self.subscriptions.lock().map_err(poisoned)?;

        Ok(subscriptions.get(channel).copied().unwrap_or(0))
    }

    /// Number of channels that currently hold a broadcast sender.
    pub fn open_channels(&self) -> Result<usize, Error> {
        Ok(self.channels.lock().map_err(poisoned)?.len())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn trigger(&self, channel: &str, event: &str, payload: String) -> Result<(), Error> {
        if payload.len() > MAX_TRANSPORT_PAYLOAD {
            return Err(Error::TransportPayloadTooLarge {
                size: payload.len(),
                limit: MAX_TRANSPORT_PAYLOAD,
            });
        }

        let message = TransportMessage {
            event: event.to_string(),
            payload,
        };
        let sender = self.channels.lock().map_err(poisoned)?.get(channel).cloned();
        let delivered = match sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        };
        if !delivered {
            debug!(channel, event, "no subscribers for realtime event");
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<BoxStream<'static, TransportMessage>, Error> {
        let receiver = {
            let mut channels = self.channels.lock().map_err(poisoned)?;
            let mut subscriptions = self.subscriptions.lock().map_err(poisoned)?;
            *subscriptions.entry(channel.to_string()).or_insert(0) += 1;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let channel = channel.to_string();
        let messages = stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) => return Some((message, receiver)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%channel, skipped, "realtime subscriber fell behind");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(Box::pin(messages))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), Error> {
        let mut channels = self.channels.lock().map_err(poisoned)?;
        let mut subscriptions = self.subscriptions.lock().map_err(poisoned)?;
        if let Some(count) = subscriptions.get_mut(channel) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subscriptions.remove(channel);
                channels.remove(channel);
            }
        }

        Ok(())
    }
}
