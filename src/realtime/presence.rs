use std::collections::HashMap;
use std::sync::Mutex;

use crate::database::poisoned;
use crate::error::Error;
use crate::user::UserId;

pub const PRESENCE_JOINED: &str = "presence:joined";
pub const PRESENCE_LEFT: &str = "presence:left";

/// Open connections per user per channel. A user is present while at least
/// one of their connections is open.
#[derive(Debug, Default)]
pub struct Presence {
    channels: Mutex<HashMap<String, HashMap<UserId, usize>>>,
}

impl Presence {
    /// Returns true when this is the user's first connection on the channel.
    pub fn join(&self, channel: &str, user_id: UserId) -> Result<bool, Error> {
        let mut channels = self.channels.lock().map_err(poisoned)?;
        let count = channels
            .entry(channel.to_string())
            .or_default()
            .entry(user_id)
            .or_insert(0);
        *count += 1;

        Ok(*count == 1)
    }

    /// Returns true when this closed the user's last connection on the channel.
    pub fn leave(&self, channel: &str, user_id: UserId) -> Result<bool, Error> {
        let mut channels = self.channels.lock().map_err(poisoned)?;
        let members = match channels.get_mut(channel) {
            Some(members) => members,
            None => return Ok(false),
        };
        let left = match members.get_mut(&user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                members.remove(&user_id);
                true
            }
            None => false,
        };
        if members.is_empty() {
            channels.remove(channel);
        }

        Ok(left)
    }

    pub fn members(&self, channel: &str) -> Result<Vec<UserId>, Error> {
        let channels = self.channels.lock().map_err(poisoned)?;

        Ok(channels
            .get(channel)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default())
    }
}
