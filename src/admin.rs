//! Admin surface interfaces.
//!
//! The HTTP/WebSocket admin frontend is an external collaborator; the core
//! exposes only these out-of-band subscriber channels and the stats
//! snapshot. Events are dropped when nothing is subscribed.

use tokio::sync::broadcast;

pub use crate::state::stats::StatsSnapshot as RealTimeStats;

/// A user lifecycle event for the admin event stream.
#[derive(Debug, Clone)]
pub enum UserEvent {
    Connected { uid: String, nick: String, host: String },
    Disconnected { uid: String, nick: String, reason: String },
    NickChange { uid: String, old: String, new: String },
    Join { uid: String, nick: String, channel: String },
    Part { uid: String, nick: String, channel: String },
    Quit { uid: String, nick: String, reason: String },
}

/// An operational notification for admin frontends.
#[derive(Debug, Clone)]
pub struct AdminNotification {
    pub level: NotificationLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Log tail access for admin frontends.
pub trait LogTail: Send + Sync {
    /// The most recent `lines` log lines, oldest first.
    fn tail(&self, lines: usize) -> Vec<String>;
}

/// Broadcast hub for the admin surface.
pub struct AdminEvents {
    user_events: broadcast::Sender<UserEvent>,
    notifications: broadcast::Sender<AdminNotification>,
}

impl AdminEvents {
    pub fn new() -> Self {
        let (user_events, _) = broadcast::channel(256);
        let (notifications, _) = broadcast::channel(64);
        Self {
            user_events,
            notifications,
        }
    }

    pub fn subscribe_user_events(&self) -> broadcast::Receiver<UserEvent> {
        self.user_events.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<AdminNotification> {
        self.notifications.subscribe()
    }

    /// Emit a user event; silently dropped with no subscribers.
    pub fn user_event(&self, event: UserEvent) {
        let _ = self.user_events.send(event);
    }

    pub fn notify(&self, level: NotificationLevel, text: impl Into<String>) {
        let _ = self.notifications.send(AdminNotification {
            level,
            text: text.into(),
        });
    }
}

impl Default for AdminEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let events = AdminEvents::new();
        let mut rx = events.subscribe_user_events();
        events.user_event(UserEvent::Connected {
            uid: "001AAAABA".into(),
            nick: "alice".into(),
            host: "h".into(),
        });
        match rx.recv().await.unwrap() {
            UserEvent::Connected { nick, .. } => assert_eq!(nick, "alice"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn no_subscriber_is_fine() {
        let events = AdminEvents::new();
        events.notify(NotificationLevel::Info, "server started");
    }
}
