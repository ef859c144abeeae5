//! Task store - the authoritative collection of download jobs
//!
//! The map lock only guards membership. Every task sits behind its own
//! mutex, so updates to unrelated tasks never wait on each other beyond
//! the lookup itself.

use crate::error::EngineError;
use mediadl_types::Task;
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

struct Entry {
    /// Insertion order, used to break `created_at` ties
    seq: u64,
    /// `None` once the task has been removed
    slot: Mutex<Option<Task>>,
}

/// Thread-safe store of all tasks
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Arc<Entry>>>,
    next_seq: AtomicU64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new task
    pub fn insert(&self, task: Task) -> Result<(), EngineError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(EngineError::DuplicateId(task.id));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        tasks.insert(
            task.id,
            Arc::new(Entry {
                seq,
                slot: Mutex::new(Some(task)),
            }),
        );
        Ok(())
    }

    /// Apply `mutator` to the task with `id` and return its result.
    ///
    /// Readers never observe a half-applied mutation. Once `remove` has
    /// returned for an id, every later update fails with `NotFound`.
    pub fn update<R>(
        &self,
        id: Uuid,
        mutator: impl FnOnce(&mut Task) -> R,
    ) -> Result<R, EngineError> {
        let entry = self.entry(id).ok_or(EngineError::NotFound(id))?;
        let mut slot = entry.slot.lock();
        let task = slot.as_mut().ok_or(EngineError::NotFound(id))?;
        Ok(mutator(task))
    }

    /// Remove a task; absent ids are ignored
    pub fn remove(&self, id: Uuid) -> Option<Task> {
        let entry = self.tasks.write().remove(&id)?;
        let removed = entry.slot.lock().take();
        removed
    }

    /// Copy of a single task
    pub fn get(&self, id: Uuid) -> Option<Task> {
        let entry = self.entry(id)?;
        let task = entry.slot.lock().clone();
        task
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.tasks.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Independent copy of every task, most recently created first
    pub fn snapshot(&self) -> Vec<Task> {
        // Collect handles first so per-task locks are never taken under the map lock
        let entries: Vec<Arc<Entry>> = self.tasks.read().values().cloned().collect();

        let mut rows: Vec<(u64, Task)> = entries
            .iter()
            .filter_map(|entry| entry.slot.lock().clone().map(|task| (entry.seq, task)))
            .collect();

        rows.sort_by_key(|(seq, task)| Reverse((task.created_at, *seq)));
        rows.into_iter().map(|(_, task)| task).collect()
    }

    fn entry(&self, id: Uuid) -> Option<Arc<Entry>> {
        self.tasks.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mediadl_types::TaskStatus;

    fn task(title: &str) -> Task {
        Task::new(title.into(), "thumb".into(), "720p".into(), "65 MB".into())
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let store = TaskStore::new();
        let first = task("a");
        let mut second = task("b");
        second.id = first.id;

        store.insert(first).unwrap();
        assert!(matches!(
            store.insert(second),
            Err(EngineError::DuplicateId(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_unknown_id() {
        let store = TaskStore::new();
        let result = store.update(Uuid::new_v4(), |t| t.progress = 50.0);
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_update_returns_mutator_result() {
        let store = TaskStore::new();
        let t = task("a");
        let id = t.id;
        store.insert(t).unwrap();

        let status = store
            .update(id, |t| {
                t.status = TaskStatus::Connecting;
                t.status
            })
            .unwrap();
        assert_eq!(status, TaskStatus::Connecting);
        assert_eq!(store.get(id).unwrap().status, TaskStatus::Connecting);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let store = TaskStore::new();
        assert!(store.remove(Uuid::new_v4()).is_none());

        let t = task("a");
        let id = t.id;
        store.insert(t).unwrap();
        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_after_remove_fails() {
        let store = TaskStore::new();
        let t = task("a");
        let id = t.id;
        store.insert(t).unwrap();

        store.remove(id);
        assert!(store.update(id, |t| t.progress = 10.0).is_err());
        assert!(!store.contains(id));
    }

    #[test]
    fn test_snapshot_newest_first() {
        let store = TaskStore::new();
        let now = Utc::now();

        let mut old = task("old");
        old.created_at = now - Duration::seconds(10);
        let mut new = task("new");
        new.created_at = now;
        let mut middle = task("middle");
        middle.created_at = now - Duration::seconds(5);

        store.insert(old).unwrap();
        store.insert(new).unwrap();
        store.insert(middle).unwrap();

        let titles: Vec<_> = store.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["new", "middle", "old"]);
    }

    #[test]
    fn test_snapshot_breaks_ties_by_insertion() {
        let store = TaskStore::new();
        let now = Utc::now();

        for title in ["first", "second", "third"] {
            let mut t = task(title);
            t.created_at = now;
            store.insert(t).unwrap();
        }

        let titles: Vec<_> = store.snapshot().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let store = TaskStore::new();
        let t = task("a");
        let id = t.id;
        store.insert(t).unwrap();

        let before = store.snapshot();
        store.update(id, |t| t.progress = 42.0).unwrap();

        assert_eq!(before[0].progress, 0.0);
        assert_eq!(store.snapshot()[0].progress, 42.0);
    }

    #[test]
    fn test_concurrent_updates_across_tasks() {
        let store = TaskStore::new();
        let ids: Vec<Uuid> = (0..8)
            .map(|i| {
                let t = task(&format!("t{}", i));
                let id = t.id;
                store.insert(t).unwrap();
                id
            })
            .collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..100 {
                        store.update(*id, |t| t.progress += 1.0).unwrap();
                    }
                });
            }
        });

        for task in store.snapshot() {
            assert_eq!(task.progress, 100.0);
        }
    }
}
