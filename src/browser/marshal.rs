//! Moving engine-thread callbacks onto the GUI thread.
//!
//! Callbacks fire on the engine's UI thread but the widgets they update live
//! on the host GUI thread. A [`GuiDispatcher`] captures a weak reference to
//! the target, queues the call, and on the GUI thread re-validates the
//! reference before running it. A target destroyed in the meantime is the
//! normal teardown race: the call is dropped without error.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace};

pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_millis(5000);

pub type GuiTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("Target object was destroyed before the call ran")]
    TargetDropped,
    #[error("GUI thread did not run the call within {0:?}")]
    Timeout(Duration),
    #[error("GUI task queue is closed")]
    QueueClosed,
}

/// GUI-thread side: owns the receiving end and runs queued calls.
///
/// Create it on the GUI thread; that thread becomes the one
/// [`GuiDispatcher::is_gui_thread`] recognises.
pub struct GuiTaskQueue {
    sender: Sender<GuiTask>,
    receiver: Receiver<GuiTask>,
    gui_thread: ThreadId,
}

impl GuiTaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            gui_thread: thread::current().id(),
        }
    }

    pub fn dispatcher(&self) -> GuiDispatcher {
        GuiDispatcher {
            sender: self.sender.clone(),
            gui_thread: self.gui_thread,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Runs every call queued so far without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            run_guarded(task);
            ran += 1;
        }
        ran
    }

    /// Runs calls as they arrive until `timeout` elapses.
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(task) => {
                    run_guarded(task);
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }
}

impl Default for GuiTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn run_guarded(task: GuiTask) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("GUI task panicked; continuing");
    }
}

/// Engine-thread side handle. Cheap to clone.
#[derive(Clone)]
pub struct GuiDispatcher {
    sender: Sender<GuiTask>,
    gui_thread: ThreadId,
}

impl GuiDispatcher {
    pub fn is_gui_thread(&self) -> bool {
        thread::current().id() == self.gui_thread
    }

    pub fn dispatch<F>(&self, task: F) -> Result<(), MarshalError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Box::new(task))
            .map_err(|_| MarshalError::QueueClosed)
    }

    /// Queues `f` for the GUI thread. If `target` is gone by the time the
    /// queue runs, `f` is silently dropped.
    pub fn post<T, F>(&self, target: &Weak<T>, f: F) -> Result<(), MarshalError>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) + Send + 'static,
    {
        let weak = Weak::clone(target);
        self.dispatch(move || match weak.upgrade() {
            Some(target) => f(&target),
            None => trace!("Marshaled call dropped, target destroyed"),
        })
    }

    /// Runs `f` on the GUI thread and waits for its result.
    ///
    /// Runs inline when already on the GUI thread. Never call this from a
    /// thread the GUI thread may itself be blocked on (it would wait out
    /// the full timeout); paint and state-change paths use [`post`](Self::post).
    pub fn post_blocking<T, R, F>(
        &self,
        target: &Weak<T>,
        f: F,
        timeout: Duration,
    ) -> Result<R, MarshalError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        if self.is_gui_thread() {
            let target = target.upgrade().ok_or(MarshalError::TargetDropped)?;
            return Ok(f(&target));
        }

        let (reply_tx, reply_rx) = channel::bounded::<Result<R, MarshalError>>(1);
        let weak = Weak::clone(target);
        self.dispatch(move || {
            let result = match weak.upgrade() {
                Some(target) => Ok(f(&target)),
                None => Err(MarshalError::TargetDropped),
            };
            // The caller may have timed out and gone away.
            let _ = reply_tx.send(result);
        })?;

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!("Blocking GUI call timed out after {:?}", timeout);
                Err(MarshalError::Timeout(timeout))
            }
            // Task was dropped without running (queue torn down).
            Err(RecvTimeoutError::Disconnected) => Err(MarshalError::QueueClosed),
        }
    }
}

/// Convenience for the common case of an `Arc` already in hand.
pub fn post_to<T, F>(dispatcher: &GuiDispatcher, target: &Arc<T>, f: F) -> Result<(), MarshalError>
where
    T: Send + Sync + 'static,
    F: FnOnce(&T) + Send + 'static,
{
    dispatcher.post(&Arc::downgrade(target), f)
}
