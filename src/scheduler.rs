//! Cancellable debounced tasks keyed by layout id
//!
//! Scheduling a task for a key replaces any task still waiting for that key.
//! A task whose delay already elapsed is left to finish so a flush is never
//! cut off halfway through.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Scheduled {
    handle: JoinHandle<()>,
    started: Arc<AtomicBool>,
}

impl Scheduled {
    /// Abort if still waiting. Returns true when the task was cancelled
    fn cancel(self) -> bool {
        if self.started.load(Ordering::SeqCst) {
            return false;
        }
        self.handle.abort();
        true
    }
}

pub struct Debouncer {
    name: &'static str,
    delay: Duration,
    tasks: Mutex<HashMap<String, Scheduled>>,
}

impl Debouncer {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, Scheduled>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `task` after the delay unless it is rescheduled or cancelled first.
    /// Returns false when there is no tokio runtime to run it on
    pub fn schedule<F>(&self, key: &str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(debouncer = self.name, key = %key, "No async runtime, task not scheduled");
            return false;
        };

        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let delay = self.delay;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            task.await;
        });

        let previous = self
            .tasks()
            .insert(key.to_string(), Scheduled { handle, started });
        if let Some(previous) = previous
            && previous.cancel()
        {
            debug!(debouncer = self.name, key = %key, "Rescheduled pending task");
        }
        true
    }

    /// Cancel the waiting task for `key`, if any
    pub fn cancel(&self, key: &str) -> bool {
        self.tasks().remove(key).is_some_and(Scheduled::cancel)
    }

    pub fn cancel_all(&self) {
        for (_, scheduled) in self.tasks().drain() {
            scheduled.cancel();
        }
    }

    /// True while a task for `key` is waiting or running
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.tasks().get(key).is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
