//! Registry of in-flight background work.
//!
//! Every listener, accepted connection and the telemetry drain registers here
//! while it runs. Shutdown waits for the registry to become empty, bounded by
//! the overall deadline.
//!
//! # Example
//!
//! ```rust
//! use portico_server::TaskRegistry;
//!
//! let registry = TaskRegistry::new();
//! let guard = registry.register("listener:rest");
//! assert_eq!(registry.len(), 1);
//!
//! drop(guard);
//! assert!(registry.is_empty());
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Shared registry of running tasks.
///
/// Cloning is cheap; all clones observe the same set of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Mutex<BTreeMap<u64, String>>,
    next_id: AtomicU64,
    idle: Notify,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under `name`.
    ///
    /// The task stays registered until the returned guard is dropped, on every
    /// exit path including panics and cancellation.
    pub fn register(&self, name: impl Into<String>) -> TaskGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        tracing::trace!(task = %name, "task registered");
        self.inner.tasks.lock().insert(id, name);
        TaskGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Spawns `future` on the runtime as a registered task.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.register(name);
        tokio::spawn(async move {
            let output = future.await;
            drop(guard);
            output
        })
    }

    /// Number of running tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Returns `true` if nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Names of the running tasks, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.tasks.lock().values().cloned().collect()
    }

    /// Waits until no task is registered.
    pub async fn wait_idle(&self) {
        loop {
            // Enable before checking so a deregistration between the check and
            // the await is not missed.
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Waits until no task is registered or `deadline` passes.
    ///
    /// Returns `true` if the registry drained in time.
    pub async fn wait_idle_until(&self, deadline: Instant) -> bool {
        tokio::time::timeout_at(deadline, self.wait_idle())
            .await
            .is_ok()
    }
}

/// Keeps a task registered while alive.
#[derive(Debug)]
#[must_use = "the task is deregistered as soon as the guard is dropped"]
pub struct TaskGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let now_empty = {
            let mut tasks = self.inner.tasks.lock();
            if let Some(name) = tasks.remove(&self.id) {
                tracing::trace!(task = %name, "task finished");
            }
            tasks.is_empty()
        };
        if now_empty {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_and_drop() {
        let registry = TaskRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        drop(a);
        assert_eq!(registry.names(), vec!["b".to_string()]);
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_names_are_tracked_separately() {
        let registry = TaskRegistry::new();
        let first = registry.register("conn");
        let second = registry.register("conn");
        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_empty() {
        let registry = TaskRegistry::new();
        tokio::time::timeout(Duration::from_millis(50), registry.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_until_times_out() {
        let registry = TaskRegistry::new();
        let _guard = registry.register("stuck");

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(!registry.wait_idle_until(deadline).await);
        assert_eq!(Instant::now(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_task_deregisters_on_completion() {
        let registry = TaskRegistry::new();
        let handle = registry.spawn("sleeper", async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            7
        });
        assert_eq!(registry.len(), 1);

        let deadline = Instant::now() + Duration::from_secs(10);
        assert!(registry.wait_idle_until(deadline).await);
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_panicking_task_deregisters() {
        let registry = TaskRegistry::new();
        let handle = registry.spawn("doomed", async {
            panic!("boom");
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_without_lost_wakeups() {
        let registry = TaskRegistry::new();
        let mut handles = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.register(format!("worker-{i}"));
                tokio::task::yield_now().await;
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            for handle in handles {
                handle.await.unwrap();
            }
            registry.wait_idle().await;
        })
        .await
        .unwrap();
        assert!(registry.is_empty());
    }
}
