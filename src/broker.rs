//! Message broker: per-connection outbound queues and fan-out.
//!
//! Each registered connection owns a bounded mpsc queue drained by its
//! write task. Enqueueing never blocks; a connection whose queue is full
//! is scheduled for disconnect instead of stalling the sender.
//!
//! Before delivery every message is tailored to the recipient's
//! negotiated capabilities: `time` tags require `server-time`, `account`
//! tags require `account-tag`, and everything else (including client-only
//! `+` tags) requires `message-tags`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use corvus_proto::{Message, Tag};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::Uid;

/// Outbound handle for one connection.
struct ConnectionHandle {
    tx: mpsc::Sender<Message>,
    caps: RwLock<HashSet<String>>,
    is_oper: AtomicBool,
}

/// The broker.
pub struct Broker {
    senders: DashMap<Uid, ConnectionHandle>,
    /// Queue for disconnect requests, drained outside fan-out paths.
    disconnect_tx: mpsc::Sender<(Uid, String)>,
}

impl Broker {
    pub fn new(disconnect_tx: mpsc::Sender<(Uid, String)>) -> Self {
        Self {
            senders: DashMap::new(),
            disconnect_tx,
        }
    }

    /// Register a connection's outbound queue and capability snapshot.
    pub fn register(&self, uid: &str, tx: mpsc::Sender<Message>, caps: HashSet<String>) {
        self.senders.insert(
            uid.to_string(),
            ConnectionHandle {
                tx,
                caps: RwLock::new(caps),
                is_oper: AtomicBool::new(false),
            },
        );
    }

    /// Drop a connection's queue (on disconnect).
    pub fn unregister(&self, uid: &str) {
        self.senders.remove(uid);
    }

    /// Replace the capability snapshot after a post-registration CAP REQ.
    pub fn update_caps(&self, uid: &str, caps: HashSet<String>) {
        if let Some(handle) = self.senders.get(uid) {
            *handle.caps.write() = caps;
        }
    }

    /// Record operator status for SendToOperators fan-out.
    pub fn set_oper(&self, uid: &str, oper: bool) {
        if let Some(handle) = self.senders.get(uid) {
            handle.is_oper.store(oper, Ordering::Relaxed);
        }
    }

    pub fn is_registered(&self, uid: &str) -> bool {
        self.senders.contains_key(uid)
    }

    /// Whether a connection negotiated a capability.
    pub fn has_cap(&self, uid: &str, cap: &str) -> bool {
        self.senders
            .get(uid)
            .is_some_and(|handle| handle.caps.read().contains(cap))
    }

    /// Send one message to one connection, tailored to its capabilities.
    pub fn send_to_uid(&self, uid: &str, msg: &Message) {
        let Some(handle) = self.senders.get(uid) else {
            return;
        };
        let tailored = tailor(msg, &handle.caps.read());
        self.enqueue(uid, &handle.tx, tailored);
    }

    /// Send to a set of connections, skipping `except`.
    pub fn send_to_many<'a>(
        &self,
        uids: impl IntoIterator<Item = &'a Uid>,
        msg: &Message,
        except: Option<&str>,
    ) {
        for uid in uids {
            if Some(uid.as_str()) == except {
                continue;
            }
            self.send_to_uid(uid, msg);
        }
    }

    /// Send to every connection whose user opered up.
    pub fn send_to_operators(&self, msg: &Message) {
        for entry in self.senders.iter() {
            if entry.value().is_oper.load(Ordering::Relaxed) {
                let tailored = tailor(msg, &entry.value().caps.read());
                self.enqueue(entry.key(), &entry.value().tx, tailored);
            }
        }
    }

    /// Send to every registered connection (GLOBAL, WALLOPS fallback).
    pub fn send_to_all(&self, msg: &Message, except: Option<&str>) {
        for entry in self.senders.iter() {
            if Some(entry.key().as_str()) == except {
                continue;
            }
            let tailored = tailor(msg, &entry.value().caps.read());
            self.enqueue(entry.key(), &entry.value().tx, tailored);
        }
    }

    fn enqueue(&self, uid: &str, tx: &mpsc::Sender<Message>, msg: Message) {
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(uid = %uid, "Send queue full, scheduling disconnect");
                let _ = self
                    .disconnect_tx
                    .try_send((uid.to_string(), "send queue full".to_string()));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(uid = %uid, "Send queue closed");
            }
        }
    }
}

/// Strip tags the recipient did not negotiate.
fn tailor(msg: &Message, caps: &HashSet<String>) -> Message {
    let Some(ref tags) = msg.tags else {
        return msg.clone();
    };

    let kept: Vec<Tag> = tags
        .iter()
        .filter(|tag| {
            if tag.0 == "time" {
                caps.contains("server-time")
            } else if tag.0 == "account" {
                caps.contains("account-tag")
            } else if tag.0 == "batch" {
                caps.contains("batch")
            } else {
                // msgid, label, and every client-only (+) tag ride on
                // message-tags.
                caps.contains("message-tags")
            }
        })
        .cloned()
        .collect();

    let mut out = msg.clone();
    out.tags = if kept.is_empty() { None } else { Some(kept) };
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn tagged_msg() -> Message {
        Message::privmsg("#a", "hi")
            .with_tag("time", Some("t".into()))
            .with_tag("account", Some("alice".into()))
            .with_tag("msgid", Some("m1".into()))
            .with_tag("+typing", Some("active".into()))
    }

    #[test]
    fn tailor_strips_unnegotiated_tags() {
        let msg = tagged_msg();

        let bare = tailor(&msg, &caps(&[]));
        assert!(bare.tags.is_none());

        let timed = tailor(&msg, &caps(&["server-time"]));
        let tags = timed.tags.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0, "time");
    }

    #[test]
    fn tailor_client_only_tags_need_message_tags() {
        let msg = tagged_msg();
        let tailored = tailor(&msg, &caps(&["message-tags"]));
        let tags = tailored.tags.unwrap();
        let keys: Vec<&str> = tags.iter().map(|t| t.0.as_str()).collect();
        assert!(keys.contains(&"msgid"));
        assert!(keys.contains(&"+typing"));
        assert!(!keys.contains(&"time"));
        assert!(!keys.contains(&"account"));
    }

    #[test]
    fn untagged_messages_pass_through() {
        let msg = Message::privmsg("#a", "hi");
        assert_eq!(tailor(&msg, &caps(&[])), msg);
    }

    #[tokio::test]
    async fn full_queue_requests_disconnect() {
        let (disc_tx, mut disc_rx) = mpsc::channel(4);
        let broker = Broker::new(disc_tx);

        let (tx, _rx) = mpsc::channel(1);
        broker.register("001AAAABA", tx, HashSet::new());

        broker.send_to_uid("001AAAABA", &Message::ping("a"));
        broker.send_to_uid("001AAAABA", &Message::ping("b"));

        let (uid, reason) = disc_rx.recv().await.unwrap();
        assert_eq!(uid, "001AAAABA");
        assert!(reason.contains("send queue full"));
    }

    #[tokio::test]
    async fn operator_fanout() {
        let (disc_tx, _disc_rx) = mpsc::channel(4);
        let broker = Broker::new(disc_tx);

        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        broker.register("001AAAABA", tx1, HashSet::new());
        broker.register("001AAAABB", tx2, HashSet::new());
        broker.set_oper("001AAAABA", true);

        broker.send_to_operators(&Message::notice("*", "oper notice"));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
