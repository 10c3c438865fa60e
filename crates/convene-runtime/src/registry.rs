//! Keyed registry of background tasks.
//!
//! Every watchdog and effect a bot runs is spawned here under a stable key
//! (`admission:{task}`, `countdown:{session}`, `reply:{session}`, ...). Each
//! task gets a child token of the registry root; cancelling the token drops
//! the task's future at its next suspension point. Entries remove themselves
//! when their task ends.
//!
//! Spawning on an occupied key replaces the entry but leaves the previous
//! task running; only an explicit cancel, or the root, stops it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

struct Entry {
    id: u64,
    token: CancellationToken,
}

/// Registry of cancellable background tasks owned by one bot instance.
pub struct TaskRegistry {
    root: CancellationToken,
    tracker: TaskTracker,
    entries: Arc<DashMap<String, Entry>>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    /// Registry with its own root token.
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Registry whose root is `root`; cancelling it stops every task.
    pub fn with_root(root: CancellationToken) -> Self {
        Self {
            root,
            tracker: TaskTracker::new(),
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn `fut` under `key`. Returns the task's cancellation token.
    pub fn spawn<F>(&self, key: impl Into<String>, fut: F) -> CancellationToken
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();

        // Insert before spawning so a task that finishes at once still finds its entry.
        let _ = self.entries.insert(
            key.clone(),
            Entry {
                id,
                token: token.clone(),
            },
        );

        let entries = Arc::clone(&self.entries);
        let task_token = token.clone();
        let _ = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = task_token.cancelled() => debug!(key = %key, "task cancelled"),
                () = fut => {}
            }
            let _ = entries.remove_if(&key, |_, entry| entry.id == id);
        });
        token
    }

    /// Cancel the task currently registered under `key`.
    pub fn cancel(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every task whose key starts with `prefix`. Returns how many.
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.iter().filter(|k| self.cancel(k)).count()
    }

    /// Whether a task is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no task is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// The root token.
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Cancel everything and wait up to `timeout` for tasks to finish.
    ///
    /// Returns `true` if every task finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.root.cancel();
        let _ = self.tracker.close();
        let finished = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        if !finished {
            warn!(remaining = self.tracker.len(), "background tasks still running after shutdown timeout");
        }
        self.entries.clear();
        finished
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_removed_when_task_ends() {
        let registry = TaskRegistry::new();
        let _ = registry.spawn("countdown:s1", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
        });
        assert!(registry.contains("countdown:s1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_future() {
        let registry = TaskRegistry::new();
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let _ = registry.spawn("reply:s1", async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.cancel("reply:s1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!reached.load(Ordering::SeqCst));
        assert!(!registry.cancel("reply:s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_key_keeps_old_task_running() {
        let registry = TaskRegistry::new();
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let _ = registry.spawn("k", async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let _ = registry.spawn("k", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(reached.load(Ordering::SeqCst));
        // The old task's completion must not evict the new entry.
        assert!(registry.contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prefix_only_matches_prefix() {
        let registry = TaskRegistry::new();
        for key in ["admission:t1", "admission:t2", "countdown:s1"] {
            let _ = registry.spawn(key, std::future::pending());
        }
        assert_eq!(registry.cancel_prefix("admission:"), 2);
        assert_eq!(registry.keys(), vec!["countdown:s1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything() {
        let registry = TaskRegistry::new();
        let token = registry.spawn("a", std::future::pending());
        let _ = registry.spawn("b", std::future::pending());

        assert!(registry.shutdown(Duration::from_secs(1)).await);
        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_after_root_cancelled_never_runs() {
        let root = CancellationToken::new();
        let registry = TaskRegistry::with_root(root.clone());
        root.cancel();

        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let token = registry.spawn("late", async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(token.is_cancelled());
        assert!(!reached.load(Ordering::SeqCst));
    }
}
