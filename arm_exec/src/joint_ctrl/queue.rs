//! Command queue between callers and a joint's worker thread.
//!
//! The queue keeps a count of unfinished commands as well as the commands themselves. A command
//! is only finished once the worker has completed (or abandoned) its motion, so an empty queue
//! doesn't mean the joint is idle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use super::{JointError, Shared};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest time a waiter sleeps before re-checking its condition. Flags are plain atomics so a
/// change to one doesn't always come with a notification.
const WAIT_POLL: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single unit of work for a joint's worker.
pub(crate) enum Command {
    /// Rotate to the given absolute angle.
    ///
    /// Units: degrees
    Rotate(f64),

    /// Rotate to the given absolute angle on the way to shutting down. Unlike
    /// [`Command::Rotate`] this is never interrupted or discarded by a drain.
    ///
    /// Units: degrees
    Home(f64),

    /// Block until the given joint's queue has fully drained.
    WaitFor(Arc<Shared>),
}

pub(crate) struct CmdQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
}

struct QueueState {
    cmds: VecDeque<Command>,
    unfinished: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                cmds: VecDeque::new(),
                unfinished: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Append a command to the back of the queue.
    pub fn put(&self, cmd: Command) -> Result<(), JointError> {
        let mut state = self.state.lock()?;
        state.cmds.push_back(cmd);
        state.unfinished += 1;
        self.cond.notify_all();

        Ok(())
    }

    /// Pop the next command, blocking for up to `timeout`.
    ///
    /// Returns `None` on timeout, or early if `interrupted` becomes true while waiting. The popped
    /// command stays unfinished until [`CmdQueue::task_done`] is called.
    pub fn pop_timeout<F>(&self, timeout: Duration, interrupted: F) -> Result<Option<Command>, JointError>
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock()?;

        loop {
            if let Some(cmd) = state.cmds.pop_front() {
                return Ok(Some(cmd));
            }

            let now = Instant::now();
            if interrupted() || now >= deadline {
                return Ok(None);
            }

            state = self
                .cond
                .wait_timeout(state, (deadline - now).min(WAIT_POLL))?
                .0;
        }
    }

    /// Mark a previously popped command as finished.
    pub fn task_done(&self) -> Result<(), JointError> {
        let mut state = self.state.lock()?;
        state.unfinished = state.unfinished.saturating_sub(1);
        self.cond.notify_all();

        Ok(())
    }

    /// Drop every queued command without executing it, marking each as finished.
    ///
    /// Returns the number of discarded commands.
    pub fn discard_all(&self) -> Result<usize, JointError> {
        let mut state = self.state.lock()?;
        let num = state.cmds.len();
        state.cmds.clear();
        state.unfinished = state.unfinished.saturating_sub(num);
        self.cond.notify_all();

        Ok(num)
    }

    /// Drop every queued command that a drain may interrupt, keeping any [`Command::Home`].
    ///
    /// Returns the number of discarded commands.
    pub fn discard_interruptible(&self) -> Result<usize, JointError> {
        let mut state = self.state.lock()?;
        let before = state.cmds.len();
        state.cmds.retain(|c| matches!(c, Command::Home(_)));
        let num = before - state.cmds.len();
        state.unfinished = state.unfinished.saturating_sub(num);
        self.cond.notify_all();

        Ok(num)
    }

    /// Number of commands waiting to be popped.
    pub fn len(&self) -> Result<usize, JointError> {
        Ok(self.state.lock()?.cmds.len())
    }

    /// Wake everyone blocked on this queue so they re-check their conditions.
    pub fn notify(&self) -> Result<(), JointError> {
        let _state = self.state.lock()?;
        self.cond.notify_all();

        Ok(())
    }

    /// Block until `done` returns true for the current number of unfinished commands.
    ///
    /// With a `timeout` of `None` this waits forever. Returns whether `done` was satisfied.
    pub fn wait_until<F>(&self, timeout: Option<Duration>, done: F) -> Result<bool, JointError>
    where
        F: Fn(usize) -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock()?;

        loop {
            if done(state.unfinished) {
                return Ok(true);
            }

            let mut sleep = WAIT_POLL;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                sleep = sleep.min(deadline - now);
            }

            state = self.cond.wait_timeout(state, sleep)?.0;
        }
    }
}
