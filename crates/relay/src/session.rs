//! Per-user conversation history.

use moverelay_config::HistoryConfig;
use moverelay_core::message::Message;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Bounds on what the store keeps. The default keeps everything forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Oldest messages are dropped once a user's history exceeds this.
    pub max_messages_per_user: Option<usize>,

    /// Histories untouched for this long are discarded.
    pub idle_ttl: Option<Duration>,
}

impl EvictionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self {
            max_messages_per_user: config.max_messages_per_user,
            idle_ttl: config.idle_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug)]
struct Session {
    messages: Vec<Message>,
    last_active: Instant,
}

/// History keyed by user id. Each call takes the store lock once, so
/// appends never interleave within a single user's history.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    policy: EvictionPolicy,
}

impl SessionStore {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Append `message` to `user_id`'s history, creating it if needed, and
    /// return a snapshot of the history after the append.
    pub async fn append(&self, user_id: &str, message: Message) -> Vec<Message> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions, now);

        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session {
                messages: Vec::new(),
                last_active: now,
            });
        session.messages.push(message);
        session.last_active = now;

        if let Some(max) = self.policy.max_messages_per_user
            && session.messages.len() > max
        {
            let excess = session.messages.len() - max;
            session.messages.drain(..excess);
            debug!(user_id, dropped = excess, "Trimmed conversation history");
        }

        session.messages.clone()
    }

    /// Snapshot of `user_id`'s history (empty if unknown or expired).
    pub async fn history(&self, user_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        match sessions.get(user_id) {
            Some(s) if !self.is_expired(s, Instant::now()) => s.messages.clone(),
            _ => Vec::new(),
        }
    }

    /// Number of users with a live history.
    pub async fn user_count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !self.is_expired(s, now))
            .count()
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        self.policy
            .idle_ttl
            .is_some_and(|ttl| now.duration_since(session.last_active) > ttl)
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Session>, now: Instant) {
        if self.policy.idle_ttl.is_none() {
            return;
        }
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle conversations");
        }
    }
}
