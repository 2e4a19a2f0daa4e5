use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Livestream, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub: committed reservations, fanned out per owner.
pub struct NotifyHub {
    channels: DashMap<UserId, broadcast::Sender<Livestream>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to new livestreams of an owner. Creates the channel if needed.
    pub fn subscribe(&self, owner_id: UserId) -> broadcast::Receiver<Livestream> {
        let sender = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, livestream: &Livestream) {
        if let Some(sender) = self.channels.get(&livestream.owner_id) {
            let _ = sender.send(livestream.clone());
        }
    }

    /// Drop channels whose receivers are all gone.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}
