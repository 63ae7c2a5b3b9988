/// Concurrency coordinator
///
/// Owns the single logic worker and the lock policy every subsystem goes
/// through. Locks are never waited on without a deadline: a section whose
/// lock is busy is skipped for the frame and retried on the next one.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::task::{TaskContext, TaskHandle, TaskShared, TaskState};
use crate::config::TimingConfig;
use crate::error::{initialization_error, EngineError, EngineResult};

/// Named shared subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockId {
    Player,
    Platforms,
    Background,
}

impl LockId {
    pub fn name(self) -> &'static str {
        match self {
            LockId::Player => "player",
            LockId::Platforms => "platforms",
            LockId::Background => "background",
        }
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A subsystem behind its named reader-writer lock
#[derive(Debug)]
pub struct Guarded<T> {
    id: LockId,
    lock: RwLock<T>,
}

impl<T> Guarded<T> {
    pub fn new(id: LockId, value: T) -> Self {
        Self {
            id,
            lock: RwLock::new(value),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn try_write_for(&self, timeout: Duration) -> Option<RwLockWriteGuard<'_, T>> {
        self.lock.try_write_for(timeout)
    }

    pub fn try_read_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, T>> {
        self.lock.try_read_for(timeout)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

/// Bounded-wait locking shared by the render thread and the logic worker
#[derive(Debug, Clone)]
pub struct LockPolicy {
    deadline: Duration,
    skipped: Arc<AtomicU64>,
}

impl LockPolicy {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Sections skipped so far because a lock was busy
    pub fn skipped_sections(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Run `task` with write access if the lock is acquired in time.
    ///
    /// Returns whether the task ran. Errors and panics raised by the task
    /// are logged and go no further.
    pub fn run_under_lock<T, F>(&self, guarded: &Guarded<T>, task: F) -> bool
    where
        F: FnOnce(&mut T) -> EngineResult<()>,
    {
        let Some(mut guard) = guarded.try_write_for(self.deadline) else {
            self.record_timeout(guarded.id());
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| task(&mut guard))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("[LockPolicy::run_under_lock] {} section failed: {}", guarded.id(), e),
            Err(panic) => log::error!(
                "[LockPolicy::run_under_lock] {} section panicked: {}",
                guarded.id(),
                panic_message(panic.as_ref())
            ),
        }
        true
    }

    /// Run `task` with read access if the lock is acquired in time
    pub fn read_under_lock<T, R, F>(&self, guarded: &Guarded<T>, task: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let Some(guard) = guarded.try_read_for(self.deadline) else {
            self.record_timeout(guarded.id());
            return None;
        };

        match catch_unwind(AssertUnwindSafe(|| task(&guard))) {
            Ok(value) => Some(value),
            Err(panic) => {
                log::error!(
                    "[LockPolicy::read_under_lock] {} read panicked: {}",
                    guarded.id(),
                    panic_message(panic.as_ref())
                );
                None
            }
        }
    }

    fn record_timeout(&self, id: LockId) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        let error = EngineError::LockTimeout {
            resource: id.name().to_string(),
            waited_ms: self.deadline.as_millis() as u64,
        };
        log::warn!("[LockPolicy] {}; skipping section this frame", error);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Count of jobs between submit and finish
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Wait until nothing is in flight. Returns what is left at the deadline.
    fn wait_drained(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.drained.wait_until(&mut count, deadline).timed_out() {
                break;
            }
        }
        *count
    }
}

pub struct ConcurrencyCoordinator {
    logic_pool: Mutex<Option<ThreadPool>>,
    accepting: AtomicBool,
    queued: Mutex<Vec<Arc<TaskShared>>>,
    in_flight: Arc<InFlight>,
    locks: LockPolicy,
    shutdown_grace: Duration,
    submitted: AtomicU64,
}

impl ConcurrencyCoordinator {
    pub fn new(timing: &TimingConfig) -> EngineResult<Self> {
        let logic_pool = ThreadPoolBuilder::new()
            .num_threads(1)
            .thread_name(|_| "game-logic".to_string())
            .panic_handler(|payload| {
                log::error!("[ConcurrencyCoordinator] Logic job panicked: {}", panic_message(payload.as_ref()))
            })
            .build()
            .map_err(|e| initialization_error("logic worker", e))?;

        log::info!(
            "[ConcurrencyCoordinator::new] Logic worker ready, lock deadline {:?}",
            timing.lock_deadline()
        );

        Ok(Self {
            logic_pool: Mutex::new(Some(logic_pool)),
            accepting: AtomicBool::new(true),
            queued: Mutex::new(Vec::new()),
            in_flight: Arc::new(InFlight::default()),
            locks: LockPolicy::new(timing.lock_deadline()),
            shutdown_grace: timing.shutdown_grace(),
            submitted: AtomicU64::new(0),
        })
    }

    /// Lock policy to hand to tasks
    pub fn locks(&self) -> &LockPolicy {
        &self.locks
    }

    pub fn run_under_lock<T, F>(&self, guarded: &Guarded<T>, task: F) -> bool
    where
        F: FnOnce(&mut T) -> EngineResult<()>,
    {
        self.locks.run_under_lock(guarded, task)
    }

    pub fn read_under_lock<T, R, F>(&self, guarded: &Guarded<T>, task: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.locks.read_under_lock(guarded, task)
    }

    /// Queue `task` on the logic worker. Fails once shut down.
    pub fn submit<F>(&self, task: F) -> EngineResult<TaskHandle>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        if !self.is_running() {
            return Err(EngineError::SubsystemUpdate {
                component: "coordinator".to_string(),
                error: "not accepting work after shutdown".to_string(),
            });
        }

        let pool = self.logic_pool.lock();
        let Some(pool) = pool.as_ref() else {
            return Err(EngineError::SubsystemUpdate {
                component: "coordinator".to_string(),
                error: "logic worker is gone".to_string(),
            });
        };

        let shared = TaskShared::new();
        shared.transition(TaskState::Idle, TaskState::Submitted);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        {
            let mut queued = self.queued.lock();
            queued.retain(|task| !task.state().is_finished());
            queued.push(Arc::clone(&shared));
        }

        self.in_flight.enter();
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let job_shared = Arc::clone(&shared);
        let in_flight = Arc::clone(&self.in_flight);
        pool.spawn_fifo(move || {
            if job_shared.transition(TaskState::Submitted, TaskState::Running) {
                let context = TaskContext::new(Arc::clone(&job_shared));
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task(&context))) {
                    log::error!(
                        "[ConcurrencyCoordinator] Logic task panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
                job_shared.transition(TaskState::Running, TaskState::Completed);
            }
            in_flight.leave();
            let _ = done_tx.send(());
        });

        Ok(TaskHandle::new(shared, done_rx))
    }

    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn submitted_tasks(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn skipped_sections(&self) -> u64 {
        self.locks.skipped_sections()
    }

    /// Stop accepting work, cancel queued tasks and wait up to the grace
    /// period for running ones. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        let cancelled = {
            let mut queued = self.queued.lock();
            let pending = queued.iter().filter(|task| task.state() == TaskState::Submitted).count();
            for task in queued.drain(..) {
                task.cancel();
            }
            pending
        };

        let abandoned = self.in_flight.wait_drained(self.shutdown_grace);
        if abandoned > 0 {
            log::warn!(
                "[ConcurrencyCoordinator::shutdown] Abandoning {} tasks after {:?}",
                abandoned,
                self.shutdown_grace
            );
        }

        self.logic_pool.lock().take();
        log::info!(
            "[ConcurrencyCoordinator::shutdown] Stopped after {} tasks ({} cancelled, {} skipped sections)",
            self.submitted_tasks(),
            cancelled,
            self.skipped_sections()
        );
    }
}

impl Drop for ConcurrencyCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::subsystem_error;

    fn coordinator() -> ConcurrencyCoordinator {
        ConcurrencyCoordinator::new(&TimingConfig {
            lock_deadline_ms: 5,
            shutdown_grace_ms: 500,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_busy_lock_skips_section_without_mutation() {
        let coordinator = coordinator();
        let counter = Guarded::new(LockId::Player, 41);

        let reader = counter.try_read_for(Duration::from_millis(1)).unwrap();
        let ran = coordinator.run_under_lock(&counter, |value| {
            *value += 1;
            Ok(())
        });
        drop(reader);

        assert!(!ran);
        assert_eq!(coordinator.skipped_sections(), 1);
        assert_eq!(*counter.try_read_for(Duration::from_millis(1)).unwrap(), 41);
        assert!(!counter.is_locked());
    }

    #[test]
    fn test_failing_section_still_counts_as_run() {
        let coordinator = coordinator();
        let value = Guarded::new(LockId::Background, 0);

        assert!(coordinator.run_under_lock(&value, |_| Err(subsystem_error("background", "boom"))));
        assert!(coordinator.run_under_lock(&value, |_| panic!("boom")));
        assert!(!value.is_locked());
        assert_eq!(coordinator.read_under_lock(&value, |v| *v), Some(0));
    }

    #[test]
    fn test_submitted_task_completes() {
        let coordinator = coordinator();
        let shared = Arc::new(Guarded::new(LockId::Platforms, Vec::<u32>::new()));
        let locks = coordinator.locks().clone();
        let task_shared = Arc::clone(&shared);

        let handle = coordinator
            .submit(move |_| {
                locks.run_under_lock(&task_shared, |v| {
                    v.push(7);
                    Ok(())
                });
            })
            .unwrap();

        assert_eq!(handle.wait(Duration::from_secs(5)), TaskState::Completed);
        assert_eq!(coordinator.read_under_lock(&shared, |v| v.clone()), Some(vec![7]));
    }

    #[test]
    fn test_timed_out_task_leaves_locks_free() {
        let coordinator = coordinator();
        let shared = Arc::new(Guarded::new(LockId::Player, 0u32));
        let locks = coordinator.locks().clone();
        let task_shared = Arc::clone(&shared);

        let handle = coordinator
            .submit(move |ctx| {
                locks.run_under_lock(&task_shared, |v| {
                    std::thread::sleep(Duration::from_millis(100));
                    *v += 1;
                    Ok(())
                });
                if ctx.is_cancelled() {
                    return;
                }
                locks.run_under_lock(&task_shared, |v| {
                    *v += 100;
                    Ok(())
                });
            })
            .unwrap();

        let started = Instant::now();
        while handle.state() != TaskState::Running && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.wait(Duration::from_millis(10)), TaskState::TimedOut);

        // Once the worker is done the lock is free and the second step never ran
        coordinator.shutdown();
        assert!(!shared.is_locked());
        assert_eq!(*shared.try_read_for(Duration::from_millis(1)).unwrap(), 1);
    }

    #[test]
    fn test_queued_task_cancelled_before_start_never_runs() {
        let coordinator = coordinator();
        let ran = Arc::new(AtomicBool::new(false));

        let blocker = coordinator
            .submit(|_| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();
        let flag = Arc::clone(&ran);
        let queued = coordinator
            .submit(move |_| flag.store(true, Ordering::SeqCst))
            .unwrap();

        queued.cancel();
        assert_eq!(queued.state(), TaskState::Cancelled);
        assert_eq!(blocker.wait(Duration::from_secs(5)), TaskState::Completed);
        assert_eq!(queued.wait(Duration::from_secs(5)), TaskState::Cancelled);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_rejects_work() {
        let coordinator = coordinator();
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(!coordinator.is_running());
        assert!(coordinator.submit(|_| {}).is_err());
    }
}
