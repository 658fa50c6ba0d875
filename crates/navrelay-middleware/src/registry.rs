//! Channel registration table.
//!
//! rosbridge expects a client to `advertise` a topic before using it.  The
//! table remembers which topics have been advertised so each one is announced
//! exactly once, and hands the whole set back at teardown for `unadvertise`.

use std::collections::HashMap;

use crate::protocol::correlation_id;

/// One advertised topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Opaque token sent with the `advertise` frame and reused to withdraw it.
    pub id: String,
    pub topic: String,
    pub msg_type: String,
}

/// At most one [`Registration`] per topic name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    entries: HashMap<String, Registration>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `topic` if it is not known yet.
    ///
    /// Returns the new [`Registration`] when one was created, `None` when the
    /// topic was already registered (the existing entry is left untouched,
    /// even if `msg_type` differs).
    pub fn register(&mut self, topic: &str, msg_type: &str) -> Option<Registration> {
        if self.entries.contains_key(topic) {
            return None;
        }
        let registration = Registration {
            id: correlation_id("advertise", topic),
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
        };
        self.entries
            .insert(topic.to_string(), registration.clone());
        Some(registration)
    }

    /// Forget `topic`, e.g. when its `advertise` never reached the peer.
    pub fn remove(&mut self, topic: &str) -> Option<Registration> {
        self.entries.remove(topic)
    }

    pub fn get(&self, topic: &str) -> Option<&Registration> {
        self.entries.get(topic)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every registration, ordered by topic.
    pub fn registrations(&self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.topic.cmp(&b.topic));
        all
    }

    /// Remove and return every registration, ordered by topic.
    pub fn drain(&mut self) -> Vec<Registration> {
        let mut all: Vec<Registration> = self.entries.drain().map(|(_, r)| r).collect();
        all.sort_by(|a, b| a.topic.cmp(&b.topic));
        all
    }
}
