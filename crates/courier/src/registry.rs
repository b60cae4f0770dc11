// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber registry.
//!
//! Three cross-linked indices back the broker's fan-out:
//!
//! - id -> subscriber record (the owner),
//! - connection -> id (attached subscribers only),
//! - topic pattern -> set of subscriber ids (the reverse index).
//!
//! A record outlives its connection: detaching clears the connection handle
//! but keeps the subscriptions, so a subscriber that reconnects under the
//! same id resumes exactly where it left off.
//!
//! `subscribe`/`unsubscribe` are the only mutators of the reverse index;
//! nothing else touches either side, which is what keeps the record's
//! pattern set and the index buckets in lockstep.

use crate::topic::TopicPattern;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Connection handle as seen by the event loop.
pub type ConnId = u64;

/// Registry operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id already has a live connection; the incumbent wins.
    AlreadyAttached { id: String },
    /// The connection has not issued a CONNECT yet.
    NotAttached,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyAttached { id } => {
                write!(f, "subscriber '{}' already attached", id)
            }
            RegistryError::NotAttached => write!(f, "connection not attached"),
        }
    }
}

impl std::error::Error for RegistryError {}

struct Subscriber {
    conn: Option<ConnId>,
    topics: HashSet<TopicPattern>,
}

/// Identity-keyed subscriber catalog with a pattern reverse index.
#[derive(Default)]
pub struct SubscriberRegistry {
    by_id: HashMap<String, Subscriber>,
    by_conn: HashMap<ConnId, String>,
    by_topic: HashMap<TopicPattern, HashSet<String>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `conn`.
    ///
    /// A known, detached id is re-bound and keeps its subscriptions; a known,
    /// attached id fails and the caller closes the new connection.
    pub fn attach(&mut self, conn: ConnId, id: &str) -> Result<(), RegistryError> {
        if let Some(subscriber) = self.by_id.get_mut(id) {
            if subscriber.conn.is_some() {
                return Err(RegistryError::AlreadyAttached { id: id.to_owned() });
            }
            subscriber.conn = Some(conn);
        } else {
            self.by_id.insert(
                id.to_owned(),
                Subscriber {
                    conn: Some(conn),
                    topics: HashSet::new(),
                },
            );
        }
        self.by_conn.insert(conn, id.to_owned());
        log::debug!("[registry] attach id='{}' conn={}", id, conn);
        Ok(())
    }

    /// Detach whatever subscriber is bound to `conn`.
    ///
    /// The record and its subscriptions are retained. Unknown connections
    /// are a silent no-op.
    pub fn detach(&mut self, conn: ConnId) {
        let Some(id) = self.by_conn.remove(&conn) else {
            return;
        };
        if let Some(subscriber) = self.by_id.get_mut(&id) {
            subscriber.conn = None;
        }
        log::debug!("[registry] detach id='{}' conn={}", id, conn);
    }

    pub fn is_attached(&self, conn: ConnId) -> bool {
        self.by_conn.contains_key(&conn)
    }

    /// Id of the subscriber attached on `conn`, if any.
    pub fn id_of(&self, conn: ConnId) -> Option<&str> {
        self.by_conn.get(&conn).map(String::as_str)
    }

    /// Add `pattern` to the subscriber's set and the reverse index.
    pub fn subscribe(&mut self, conn: ConnId, pattern: TopicPattern) -> Result<(), RegistryError> {
        let id = self.by_conn.get(&conn).ok_or(RegistryError::NotAttached)?;
        let subscriber = self
            .by_id
            .get_mut(id)
            .expect("conn index entry without an id record");

        subscriber.topics.insert(pattern.clone());
        self.by_topic.entry(pattern).or_default().insert(id.clone());
        Ok(())
    }

    /// Remove `pattern` from the subscriber's set and the reverse index,
    /// dropping the index bucket when it empties.
    pub fn unsubscribe(
        &mut self,
        conn: ConnId,
        pattern: &TopicPattern,
    ) -> Result<(), RegistryError> {
        let id = self.by_conn.get(&conn).ok_or(RegistryError::NotAttached)?;
        let subscriber = self
            .by_id
            .get_mut(id)
            .expect("conn index entry without an id record");

        subscriber.topics.remove(pattern);
        if let Some(bucket) = self.by_topic.get_mut(pattern) {
            bucket.remove(id.as_str());
            if bucket.is_empty() {
                self.by_topic.remove(pattern);
            }
        }
        Ok(())
    }

    /// Connections of every attached subscriber holding a pattern that
    /// matches `topic`.
    ///
    /// The result is a set: a subscriber with several matching patterns is
    /// delivered to once. Cost is linear in the number of distinct patterns.
    pub fn recipients_for(&self, topic: &TopicPattern) -> HashSet<ConnId> {
        let mut recipients = HashSet::new();
        for (pattern, ids) in &self.by_topic {
            if !pattern.matches(topic) {
                continue;
            }
            for id in ids {
                if let Some(subscriber) = self.by_id.get(id) {
                    if let Some(conn) = subscriber.conn {
                        recipients.insert(conn);
                    }
                }
            }
        }
        recipients
    }

    /// Number of distinct patterns in the reverse index.
    pub fn pattern_count(&self) -> usize {
        self.by_topic.len()
    }
}
