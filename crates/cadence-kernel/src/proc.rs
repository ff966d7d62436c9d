//! The kernel process table.
//!
//! An auxiliary registry for long-running processes the embedding
//! blockchain wants the kernel to supervise. Scheduling registers a
//! process; `run_all` launches the registered ones; `kill` and `stop_all`
//! signal shutdown through a watch channel after the courtesy `stopping`
//! call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// A supervised kernel process.
#[async_trait]
pub trait Process: Send + Sync {
    /// Process name for logs.
    fn name(&self) -> &str;

    /// Namespace the process belongs to.
    fn namespace(&self) -> &str;

    /// Run until `shutdown` flips to true.
    async fn run(&self, shutdown: watch::Receiver<bool>);

    /// Courtesy notification sent just before shutdown is signaled.
    fn stopping(&self);
}

struct ProcEntry {
    process: Arc<dyn Process>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

/// Registry of supervised processes keyed by pid.
pub struct ProcTable {
    procs: RwLock<HashMap<u64, Arc<ProcEntry>>>,
    next_pid: AtomicU64,
}

impl ProcTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            procs: RwLock::new(HashMap::new()),
            next_pid: AtomicU64::new(0),
        }
    }

    /// Register a process. It does not run until `run_all`.
    pub fn schedule(&self, process: Arc<dyn Process>) -> u64 {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let (shutdown, _) = watch::channel(false);
        let entry = Arc::new(ProcEntry {
            process,
            shutdown,
            running: AtomicBool::new(false),
        });
        self.procs.write().insert(pid, entry);
        pid
    }

    /// Whether a pid is registered.
    pub fn is_scheduled(&self, pid: u64) -> bool {
        self.procs.read().contains_key(&pid)
    }

    /// Launch every registered process that is not already running.
    pub fn run_all(&self) {
        for (pid, entry) in self.procs.read().iter() {
            if entry.running.swap(true, Ordering::SeqCst) {
                continue;
            }
            debug!(
                pid,
                name = entry.process.name(),
                namespace = entry.process.namespace(),
                "starting kernel process"
            );
            let process = Arc::clone(&entry.process);
            let rx = entry.shutdown.subscribe();
            let entry = Arc::clone(entry);
            tokio::spawn(async move {
                process.run(rx).await;
                entry.running.store(false, Ordering::SeqCst);
            });
        }
    }

    /// Stop and unregister a process.
    pub fn kill(&self, pid: u64) {
        let removed = self.procs.write().remove(&pid);
        if let Some(entry) = removed {
            if entry.running.load(Ordering::SeqCst) {
                entry.process.stopping();
            }
            let _ = entry.shutdown.send(true);
        }
    }

    /// Signal shutdown to every running process; entries stay registered.
    pub fn stop_all(&self) {
        for entry in self.procs.read().values() {
            if entry.running.load(Ordering::SeqCst) {
                entry.process.stopping();
                let _ = entry.shutdown.send(true);
            }
        }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct TestProcess {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Process for TestProcess {
        fn name(&self) -> &str {
            "test-proc"
        }
        fn namespace(&self) -> &str {
            "tests"
        }
        async fn run(&self, mut shutdown: watch::Receiver<bool>) {
            self.events.lock().push("started");
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            self.events.lock().push("stopped");
        }
        fn stopping(&self) {
            self.events.lock().push("stopping");
        }
    }

    #[tokio::test]
    async fn test_schedule_registers_without_running() {
        let table = ProcTable::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let pid = table.schedule(Arc::new(TestProcess {
            events: Arc::clone(&events),
        }));

        assert!(table.is_scheduled(pid));
        sleep(Duration::from_millis(20)).await;
        assert!(events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_kill_signals_and_unregisters() {
        let table = ProcTable::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let pid = table.schedule(Arc::new(TestProcess {
            events: Arc::clone(&events),
        }));
        table.run_all();

        timeout(Duration::from_secs(1), async {
            while events.lock().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("process started");

        table.kill(pid);
        assert!(!table.is_scheduled(pid));
        timeout(Duration::from_secs(1), async {
            while !events.lock().contains(&"stopped") {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("process stopped");
        assert_eq!(*events.lock(), vec!["started", "stopping", "stopped"]);
    }

    #[tokio::test]
    async fn test_stop_all_reaches_every_running_process() {
        let table = ProcTable::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        table.schedule(Arc::new(TestProcess {
            events: Arc::clone(&first),
        }));
        table.schedule(Arc::new(TestProcess {
            events: Arc::clone(&second),
        }));
        table.run_all();

        timeout(Duration::from_secs(1), async {
            while first.lock().is_empty() || second.lock().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("processes started");

        table.stop_all();
        timeout(Duration::from_secs(1), async {
            while !first.lock().contains(&"stopped") || !second.lock().contains(&"stopped") {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("processes stopped");
    }
}
