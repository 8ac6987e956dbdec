//! Ordered task queues and completion events
//!
//! A [`Queue`] is an independent ordered task stream bound to one device,
//! backed by a single worker thread: tasks run in submission order, queues
//! on different devices (or two queues on one device) are mutually
//! unordered. Enqueuing returns an [`Event`] supporting a blocking wait
//! and a non-blocking completion probe.
//!
//! A backend fault while a task runs surfaces through that task's event;
//! the queue then enters a poisoned, non-retryable state and must be
//! recreated. Dropping a queue with outstanding tasks waits for them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, debug_span};

use crate::device::Device;
use crate::error::{AccelError, Result};
use crate::task::TaskRun;

#[derive(Debug)]
enum EventState {
    Enqueued,
    Running,
    Complete,
    Failed(String),
}

#[derive(Debug)]
struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

/// Completion token for one enqueued task
#[derive(Debug, Clone)]
pub struct Event(Arc<EventInner>);

impl Event {
    fn new() -> Self {
        Event(Arc::new(EventInner {
            state: Mutex::new(EventState::Enqueued),
            cond: Condvar::new(),
        }))
    }

    fn transition(&self, next: EventState) {
        let mut state = self.0.state.lock();
        *state = next;
        self.0.cond.notify_all();
    }

    /// Block until the task (and, transitively, every task enqueued before
    /// it on the same queue) has completed
    pub fn wait(&self) -> Result<()> {
        let mut state = self.0.state.lock();
        loop {
            match &*state {
                EventState::Complete => return Ok(()),
                EventState::Failed(msg) => return Err(AccelError::execution_fault(msg.clone())),
                EventState::Enqueued | EventState::Running => self.0.cond.wait(&mut state),
            }
        }
    }

    /// Non-blocking probe: true once the task finished, successfully or not
    pub fn is_complete(&self) -> bool {
        matches!(*self.0.state.lock(), EventState::Complete | EventState::Failed(_))
    }
}

type BoxedTask = Box<dyn FnOnce() -> Result<()> + Send>;

enum WorkerMsg {
    Task(BoxedTask, Event),
    Shutdown,
}

/// Ordered task stream on one device
pub struct Queue {
    device: Device,
    tx: Sender<WorkerMsg>,
    worker: Option<JoinHandle<()>>,
    poisoned: Arc<AtomicBool>,
    last: Mutex<Option<Event>>,
}

impl Queue {
    /// Create an independent queue on `device`
    pub fn new(device: &Device) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<WorkerMsg>();
        let poisoned = Arc::new(AtomicBool::new(false));
        let worker_poisoned = Arc::clone(&poisoned);
        let worker = std::thread::Builder::new()
            .name("tessera-queue".into())
            .spawn(move || {
                let span = debug_span!("queue_worker");
                let _enter = span.enter();
                for msg in rx {
                    match msg {
                        WorkerMsg::Task(task, event) => {
                            if worker_poisoned.load(Ordering::Acquire) {
                                event.transition(EventState::Failed(AccelError::QueuePoisoned.to_string()));
                                continue;
                            }
                            event.transition(EventState::Running);
                            match task() {
                                Ok(()) => event.transition(EventState::Complete),
                                Err(err) => {
                                    debug!(%err, "task failed; poisoning queue");
                                    worker_poisoned.store(true, Ordering::Release);
                                    event.transition(EventState::Failed(err.to_string()));
                                }
                            }
                        }
                        WorkerMsg::Shutdown => break,
                    }
                }
            })
            .map_err(|e| AccelError::AllocationFailed {
                what: format!("queue worker thread: {e}"),
                bytes: 0,
            })?;
        Ok(Queue {
            device: device.clone(),
            tx,
            worker: Some(worker),
            poisoned,
            last: Mutex::new(None),
        })
    }

    /// Device this queue is bound to
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Submit a task for ordered asynchronous execution.
    ///
    /// The task is consumed; construct a new task per submission. Fails
    /// with [`AccelError::QueuePoisoned`] once an earlier task has faulted.
    pub fn enqueue<T>(&self, task: T) -> Result<Event>
    where
        T: TaskRun + Send + 'static,
    {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(AccelError::QueuePoisoned);
        }
        let event = Event::new();
        self.tx
            .send(WorkerMsg::Task(Box::new(move || task.run()), event.clone()))
            .map_err(|_| AccelError::WorkerLost)?;
        *self.last.lock() = Some(event.clone());
        Ok(event)
    }

    /// Wait for every task enqueued so far; equivalent to waiting on the
    /// most recently enqueued event
    pub fn wait_idle(&self) -> Result<()> {
        let last = self.last.lock().clone();
        match last {
            Some(event) => event.wait(),
            None => Ok(()),
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        // Outstanding tasks finish before the queue goes away.
        let _ = self.tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{enumerate_devices, Platform};

    struct OkTask;
    impl TaskRun for OkTask {
        fn run(self) -> Result<()> {
            Ok(())
        }
    }

    struct FailTask;
    impl TaskRun for FailTask {
        fn run(self) -> Result<()> {
            Err(AccelError::execution_fault("synthetic fault"))
        }
    }

    struct AppendTask(Arc<Mutex<Vec<u32>>>, u32);
    impl TaskRun for AppendTask {
        fn run(self) -> Result<()> {
            self.0.lock().push(self.1);
            Ok(())
        }
    }

    fn host_device() -> Device {
        enumerate_devices(Platform::Host).unwrap().remove(0)
    }

    #[test]
    fn test_enqueue_and_wait() {
        let queue = Queue::new(&host_device()).unwrap();
        let event = queue.enqueue(OkTask).unwrap();
        event.wait().unwrap();
        assert!(event.is_complete());
    }

    #[test]
    fn test_submission_order() {
        let queue = Queue::new(&host_device()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            queue.enqueue(AppendTask(Arc::clone(&log), i)).unwrap();
        }
        queue.wait_idle().unwrap();
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_fault_poisons_queue() {
        let queue = Queue::new(&host_device()).unwrap();
        let failed = queue.enqueue(FailTask).unwrap();
        let err = failed.wait().unwrap_err();
        assert!(err.to_string().contains("synthetic fault"));

        // Later submissions are rejected or failed; the queue is done.
        match queue.enqueue(OkTask) {
            Err(AccelError::QueuePoisoned) => {}
            Ok(event) => assert!(event.wait().is_err()),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wait_idle_on_empty_queue() {
        let queue = Queue::new(&host_device()).unwrap();
        queue.wait_idle().unwrap();
    }
}
