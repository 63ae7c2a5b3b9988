/// Task handles for work submitted to the logic worker
///
/// A task moves `Submitted -> Running -> Completed`, unless the waiter
/// gives up first. A waiter that times out marks a queued task
/// `Cancelled` (it will never start) and a running one `TimedOut` (it
/// finishes in the background and its cancel flag is raised).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Idle = 0,
    Submitted = 1,
    Running = 2,
    Completed = 3,
    TimedOut = 4,
    Cancelled = 5,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::Submitted,
            2 => TaskState::Running,
            3 => TaskState::Completed,
            4 => TaskState::TimedOut,
            5 => TaskState::Cancelled,
            _ => TaskState::Idle,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::TimedOut | TaskState::Cancelled)
    }
}

/// State shared between a handle and its job
#[derive(Debug)]
pub(crate) struct TaskShared {
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl TaskShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(TaskState::Idle as u8),
            cancelled: AtomicBool::new(false),
        })
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.transition(TaskState::Submitted, TaskState::Cancelled);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Passed to running tasks so they can stop between steps
#[derive(Debug, Clone)]
pub struct TaskContext {
    shared: Arc<TaskShared>,
}

impl TaskContext {
    pub(crate) fn new(shared: Arc<TaskShared>) -> Self {
        Self { shared }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

/// Awaitable handle to one submitted task
#[derive(Debug)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
    done: Receiver<()>,
}

impl TaskHandle {
    pub(crate) fn new(shared: Arc<TaskShared>, done: Receiver<()>) -> Self {
        Self { shared, done }
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Wait up to `deadline` for the task to finish
    pub fn wait(&self, deadline: Duration) -> TaskState {
        match self.done.recv_timeout(deadline) {
            Ok(()) => self.shared.state(),
            Err(RecvTimeoutError::Timeout) => {
                self.shared.cancel();
                if self.shared.transition(TaskState::Running, TaskState::TimedOut) {
                    return TaskState::TimedOut;
                }
                self.shared.state()
            }
            // Job dropped without running, e.g. the worker shut down
            Err(RecvTimeoutError::Disconnected) => {
                self.shared.cancel();
                match self.shared.state() {
                    TaskState::Completed => TaskState::Completed,
                    TaskState::TimedOut => TaskState::TimedOut,
                    _ => {
                        self.shared.state.store(TaskState::Cancelled as u8, Ordering::Release);
                        TaskState::Cancelled
                    }
                }
            }
        }
    }
}
