//! Logic worker and lock discipline
pub mod coordinator;
pub mod task;

pub use coordinator::{ConcurrencyCoordinator, Guarded, LockId, LockPolicy};
pub use task::{TaskContext, TaskHandle, TaskState};
