//! Change feed for live detail pages.
//!
//! A single broadcast channel carries every bot event. Subscribers filter by
//! bot and skip whatever they missed while lagging; nothing in the catalog
//! waits on them.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Bot, Comment, VoteOutcome};

const FEED_CAPACITY: usize = 256;

/// Something that happened to one bot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BotEvent {
    Updated { bot: Bot },
    #[serde(rename_all = "camelCase")]
    Deleted { bot_id: String },
    #[serde(rename_all = "camelCase")]
    Voted { bot_id: String, outcome: VoteOutcome },
    Commented { comment: Comment },
}

impl BotEvent {
    pub fn bot_id(&self) -> &str {
        match self {
            BotEvent::Updated { bot } => &bot.bot_id,
            BotEvent::Deleted { bot_id } | BotEvent::Voted { bot_id, .. } => bot_id,
            BotEvent::Commented { comment } => &comment.bot_id,
        }
    }

    /// Event name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            BotEvent::Updated { .. } => "updated",
            BotEvent::Deleted { .. } => "deleted",
            BotEvent::Voted { .. } => "voted",
            BotEvent::Commented { .. } => "commented",
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<BotEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is normal.
    pub fn emit(&self, event: BotEvent) {
        let kind = event.kind();
        if let Ok(receivers) = self.sender.send(event) {
            tracing::trace!(kind, receivers, "Change event delivered");
        }
    }

    pub fn subscribe(&self, bot_id: &str) -> BotSubscription {
        BotSubscription {
            bot_id: bot_id.to_string(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Events of one bot, in emission order.
pub struct BotSubscription {
    bot_id: String,
    receiver: broadcast::Receiver<BotEvent>,
}

impl BotSubscription {
    /// Wait for the next event of this bot. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<BotEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.bot_id() == self.bot_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(bot_id = %self.bot_id, skipped, "Subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deleted(bot_id: &str) -> BotEvent {
        BotEvent::Deleted {
            bot_id: bot_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscription_filters_by_bot() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("a");

        feed.emit(deleted("b"));
        feed.emit(deleted("a"));

        let event = sub.next().await.unwrap();
        assert_eq!(event.bot_id(), "a");
        assert_eq!(event.kind(), "deleted");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("a");

        for _ in 0..FEED_CAPACITY + 10 {
            feed.emit(deleted("b"));
        }
        feed.emit(deleted("a"));

        assert_eq!(sub.next().await.unwrap().bot_id(), "a");
    }

    #[tokio::test]
    async fn test_closed_feed_ends_subscription() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("a");
        drop(feed);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(deleted("a")).unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["botId"], "a");
    }
}
