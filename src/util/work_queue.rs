use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::util::assert::hard_fail;

/// Identifies classes of scheduled tasks so tests can force them to run
/// ahead of their delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Matches every scheduled task, regardless of its own id.
    All,
    /// Periodic cache garbage collection.
    GarbageCollectionDelay,
    /// Transaction retry scheduling in the layer above.
    RetryTransaction,
}

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    id: u64,
    timer_id: TimerId,
    target_time: Instant,
    task: Task,
}

struct State {
    immediate: VecDeque<Task>,
    scheduled: Vec<Scheduled>,
    next_id: u64,
    busy: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

/// Serial task executor backing all mutating access to the cache.
///
/// Tasks run strictly one at a time, to completion, in enqueue order, on a
/// dedicated worker thread. Scheduled tasks wait out their delay unless a
/// test forces them through [`WorkQueue::run_delayed_tasks_until`]. The
/// single-queue discipline is what lets the storage components stay free of
/// internal locking.
pub struct WorkQueue {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

/// Cancelable handle for a task scheduled with [`WorkQueue::enqueue_after`].
pub struct DelayedTask {
    id: u64,
    shared: Arc<Shared>,
}

impl DelayedTask {
    /// Remove the task from the schedule. Has no effect if it already ran.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.scheduled.retain(|entry| entry.id != self.id);
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                immediate: VecDeque::new(),
                scheduled: Vec::new(),
                next_id: 0,
                busy: false,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || worker_loop(worker_shared));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Run a task after all previously enqueued tasks have completed.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.state.lock().unwrap();
        if state.shutdown {
            return;
        }
        state.immediate.push_back(Box::new(task));
        self.shared.wake.notify_all();
    }

    /// Schedule a task to run once `delay` has elapsed.
    ///
    /// The schedule is ordered by target time, ties broken by scheduling
    /// order. After shutdown the task is silently discarded and the returned
    /// handle is inert.
    pub fn enqueue_after(
        &self,
        delay: Duration,
        timer_id: TimerId,
        task: impl FnOnce() + Send + 'static,
    ) -> DelayedTask {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        if !state.shutdown {
            state.scheduled.push(Scheduled {
                id,
                timer_id,
                target_time: Instant::now() + delay,
                task: Box::new(task),
            });
            self.shared.wake.notify_all();
        }
        DelayedTask {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until every enqueued task and every scheduled task whose delay
    /// has already elapsed has run. Must not be called from the worker.
    pub fn drain(&self) {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            let now = Instant::now();
            let pending = state.busy
                || !state.immediate.is_empty()
                || state.scheduled.iter().any(|entry| entry.target_time <= now);
            if !pending {
                return;
            }
            let (next, _) = self
                .shared
                .wake
                .wait_timeout(state, Duration::from_millis(10))
                .unwrap();
            state = next;
        }
    }

    /// Immediately run scheduled tasks, in schedule order, up to and
    /// including the first whose timer id matches. `TimerId::All` flushes the
    /// entire schedule. Blocks until the promoted tasks have completed.
    ///
    /// Panics when a specific timer id is requested and nothing on the
    /// schedule carries it.
    pub fn run_delayed_tasks_until(&self, timer_id: TimerId) {
        let found = {
            let mut state = self.shared.state.lock().unwrap();
            state.scheduled.sort_by_key(|entry| (entry.target_time, entry.id));
            let stop = match timer_id {
                TimerId::All => Some(state.scheduled.len()),
                _ => state
                    .scheduled
                    .iter()
                    .position(|entry| entry.timer_id == timer_id)
                    .map(|index| index + 1),
            };
            match stop {
                Some(stop) => {
                    let promoted: Vec<Scheduled> = state.scheduled.drain(..stop).collect();
                    for entry in promoted {
                        state.immediate.push_back(entry.task);
                    }
                    self.shared.wake.notify_all();
                    true
                }
                None => false,
            }
        };
        if !found {
            hard_fail(format!("No scheduled task found for timer id: {timer_id:?}"));
        }
        self.drain();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if let Some(task) = state.immediate.pop_front() {
            state.busy = true;
            drop(state);
            task();
            state = shared.state.lock().unwrap();
            state.busy = false;
            shared.wake.notify_all();
            continue;
        }
        let now = Instant::now();
        if let Some(index) = due_index(&state.scheduled, now) {
            let entry = state.scheduled.remove(index);
            state.busy = true;
            drop(state);
            (entry.task)();
            state = shared.state.lock().unwrap();
            state.busy = false;
            shared.wake.notify_all();
            continue;
        }
        if state.shutdown {
            return;
        }
        state = match earliest_target(&state.scheduled) {
            Some(target) => {
                let timeout = target.saturating_duration_since(now);
                let (next, _) = shared.wake.wait_timeout(state, timeout).unwrap();
                next
            }
            None => shared.wake.wait(state).unwrap(),
        };
    }
}

fn due_index(scheduled: &[Scheduled], now: Instant) -> Option<usize> {
    scheduled
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.target_time <= now)
        .min_by_key(|(_, entry)| (entry.target_time, entry.id))
        .map(|(index, _)| index)
}

fn earliest_target(scheduled: &[Scheduled]) -> Option<Instant> {
    scheduled.iter().map(|entry| entry.target_time).min()
}
