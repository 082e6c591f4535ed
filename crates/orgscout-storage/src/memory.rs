//! Short-term, per-conversation memory.
//!
//! Two append-only namespaces share one retention window: the enriched
//! queries of past turns and the organizations seen in past answers.
//! Expired entries are dropped when their conversation is touched, and
//! idle conversations are swept once per retention window on append.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use orgscout_core::error::ScoutError;
use orgscout_core::types::OrgInfo;

/// Upper bound on live entries kept per conversation; older ones are
/// dropped first. Reads never ask for more than a handful.
pub const MAX_ENTRIES_PER_CONVERSATION: usize = 64;

struct Entry<T> {
    inserted: Instant,
    value: T,
}

struct Rooms<T> {
    by_conversation: HashMap<String, VecDeque<Entry<T>>>,
    last_sweep: Instant,
}

/// One keyed namespace. Entries per conversation are kept in insertion
/// order, so the newest is always at the back.
struct Namespace<T> {
    label: &'static str,
    retention: Duration,
    rooms: Mutex<Rooms<T>>,
}

fn prune<T>(queue: &mut VecDeque<Entry<T>>, retention: Duration) -> usize {
    let before = queue.len();
    while queue
        .front()
        .is_some_and(|entry| entry.inserted.elapsed() >= retention)
    {
        queue.pop_front();
    }
    before - queue.len()
}

impl<T: Clone> Namespace<T> {
    fn new(label: &'static str, retention: Duration) -> Self {
        Self {
            label,
            retention,
            rooms: Mutex::new(Rooms {
                by_conversation: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Rooms<T>>, ScoutError> {
        self.rooms
            .lock()
            .map_err(|e| ScoutError::Storage(format!("Memory lock poisoned: {}", e)))
    }

    fn append(&self, conversation_id: &str, value: T) -> Result<(), ScoutError> {
        let mut rooms = self.lock()?;
        if rooms.last_sweep.elapsed() >= self.retention {
            self.sweep(&mut rooms);
        }

        let queue = rooms
            .by_conversation
            .entry(conversation_id.to_string())
            .or_default();
        prune(queue, self.retention);
        queue.push_back(Entry {
            inserted: Instant::now(),
            value,
        });
        while queue.len() > MAX_ENTRIES_PER_CONVERSATION {
            queue.pop_front();
        }
        Ok(())
    }

    /// Drop expired entries of every conversation, and conversations left empty.
    fn sweep(&self, rooms: &mut Rooms<T>) {
        let before = rooms.by_conversation.len();
        rooms
            .by_conversation
            .retain(|_, queue| {
                prune(queue, self.retention);
                !queue.is_empty()
            });
        rooms.last_sweep = Instant::now();
        let dropped = before - rooms.by_conversation.len();
        if dropped > 0 {
            debug!(namespace = self.label, dropped, "Swept idle conversations");
        }
    }

    fn read_recent(&self, conversation_id: &str, n: usize) -> Result<Vec<T>, ScoutError> {
        let mut rooms = self.lock()?;

        let Some(queue) = rooms.by_conversation.get_mut(conversation_id) else {
            return Ok(Vec::new());
        };

        let pruned = prune(queue, self.retention);
        if pruned > 0 {
            debug!(
                conversation_id,
                namespace = self.label,
                pruned,
                "Dropped expired memory entries"
            );
        }

        let recent = queue
            .iter()
            .rev()
            .take(n)
            .map(|entry| entry.value.clone())
            .collect();

        if queue.is_empty() {
            rooms.by_conversation.remove(conversation_id);
        }
        Ok(recent)
    }

    #[cfg(test)]
    fn held(&self) -> (usize, usize) {
        let rooms = self.rooms.lock().unwrap();
        let entries = rooms.by_conversation.values().map(VecDeque::len).sum();
        (rooms.by_conversation.len(), entries)
    }
}

/// Time-bounded conversation memory, safe to share across connections.
pub struct MemoryStore {
    retention: Duration,
    queries: Namespace<String>,
    entities: Namespace<OrgInfo>,
}

impl MemoryStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            queries: Namespace::new("queries", retention),
            entities: Namespace::new("entities", retention),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Remember the enriched query (or raw text) of a finished turn.
    pub fn append_query(&self, conversation_id: &str, query: &str) -> Result<(), ScoutError> {
        self.queries.append(conversation_id, query.to_string())
    }

    /// Up to `n` live queries, most recent first.
    pub fn recent_queries(&self, conversation_id: &str, n: usize) -> Result<Vec<String>, ScoutError> {
        self.queries.read_recent(conversation_id, n)
    }

    /// Remember an organization mentioned in an answer.
    pub fn append_entity(&self, conversation_id: &str, entity: OrgInfo) -> Result<(), ScoutError> {
        self.entities.append(conversation_id, entity)
    }

    /// Up to `n` live organizations, most recent first.
    pub fn recent_entities(
        &self,
        conversation_id: &str,
        n: usize,
    ) -> Result<Vec<OrgInfo>, ScoutError> {
        self.entities.read_recent(conversation_id, n)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("retention", &self.retention)
            .finish()
    }
}
