//! The task contract shared by exec, copy, and set tasks
//!
//! Tasks are inert values once built. Running one consumes it, so a task
//! can be submitted exactly once — resubmission is a compile error, not a
//! runtime check. Construct a new task per submission.

use crate::error::Result;

/// A built, immutable unit of work.
///
/// Drive it directly with [`run`](TaskRun::run) for a synchronous effect,
/// or hand it to [`Queue::enqueue`](crate::Queue::enqueue) for ordered
/// asynchronous execution.
pub trait TaskRun {
    /// Execute the task on the calling thread
    fn run(self) -> Result<()>;
}
