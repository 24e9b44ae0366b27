// ── Recent activity feed ──

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::model::{ActivityEntry, ActivityKind};

/// Bounded, newest-first ring buffer of human-readable events.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, kind: ActivityKind, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(ActivityEntry {
            timestamp,
            kind,
            message: message.into(),
        });
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_beyond_capacity() {
        let mut log = ActivityLog::new(3);
        let now = Utc::now();
        for n in 0..5 {
            log.push(now, ActivityKind::LevelChanged, format!("event {n}"));
        }
        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 4", "event 3", "event 2"]);
        assert_eq!(log.len(), 3);
    }
}
