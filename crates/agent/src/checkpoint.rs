//! Thread checkpoints: per-thread message state between invocations.

use async_trait::async_trait;
use moverelay_core::message::Message;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persists the message state of a thread.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Messages saved for `thread_id`, or empty if none.
    async fn load(&self, thread_id: &str) -> Vec<Message>;

    /// Replace the saved state of `thread_id`.
    async fn save(&self, thread_id: &str, messages: Vec<Message>);
}

/// In-process checkpointer. State lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn save(&self, thread_id: &str, messages: Vec<Message>) {
        self.threads
            .write()
            .await
            .insert(thread_id.to_string(), messages);
    }
}

/// Merge `incoming` into `saved`: a message whose id is already present
/// replaces the saved copy in place, anything else is appended.
pub fn merge_messages(mut saved: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    for msg in incoming {
        match saved.iter_mut().find(|m| m.id == msg.id) {
            Some(existing) => *existing = msg,
            None => saved.push(msg),
        }
    }
    saved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_thread_is_empty() {
        let cp = MemoryCheckpointer::new();
        assert!(cp.load("nope").await.is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let cp = MemoryCheckpointer::new();
        cp.save("t1", vec![Message::user("hi")]).await;
        cp.save("t2", vec![Message::user("a"), Message::user("b")]).await;

        assert_eq!(cp.load("t1").await.len(), 1);
        assert_eq!(cp.load("t2").await.len(), 2);
        assert_eq!(cp.thread_count().await, 2);
    }

    #[test]
    fn merge_replaces_by_id_and_appends_new() {
        let first = Message::user("one");
        let second = Message::user("two");
        let mut edited = first.clone();
        edited.content = "one (edited)".into();
        let third = Message::user("three");

        let merged = merge_messages(vec![first, second.clone()], vec![edited, third]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].content, "one (edited)");
        assert_eq!(merged[1].id, second.id);
        assert_eq!(merged[2].content, "three");
    }
}
