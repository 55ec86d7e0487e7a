//! Worker thread executing a joint's queued commands.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::{
    sync::{atomic::Ordering, Arc},
    thread,
    time::Duration,
};

use log::{debug, error, info, trace, warn};

use super::{queue::Command, steps::StepPlan, JointError, Shared};
use crate::servo_ctrl::clamp_angle;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// How long the worker blocks on an empty queue before re-checking its flags.
pub(crate) const IDLE_POLL: Duration = Duration::from_millis(100);

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Clears the running flag when the worker exits, including by panic.
struct RunningGuard<'a>(&'a Shared);

/// How a rotation ended.
#[derive(Debug, PartialEq)]
enum Motion {
    Complete,
    Drained,
    Failed,
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

pub(super) fn worker_thread(shared: Arc<Shared>) {
    let _guard = RunningGuard(&shared);

    info!("{} started", shared.params.name);

    if let Err(e) = run(&shared) {
        error!("{} worker stopped on error: {}", shared.params.name, e);
    }

    // Anything still queued will never run, so finish it off to release any waiters
    match shared.queue.discard_all() {
        Ok(0) => (),
        Ok(n) => debug!("{} discarded {} commands on exit", shared.params.name, n),
        Err(e) => warn!("{} couldn't clear its queue on exit: {}", shared.params.name, e),
    }

    // Leave the flags as a freshly constructed joint would have them so it can be restarted
    shared.drain_requested.store(false, Ordering::SeqCst);
    shared.shutdown_requested.store(false, Ordering::SeqCst);
    shared.accepting.store(true, Ordering::SeqCst);

    info!("{} stopped", shared.params.name);
}

fn run(shared: &Shared) -> Result<(), JointError> {
    loop {
        // ---- TERMINATING ----
        if shared.shutdown_requested.load(Ordering::SeqCst) {
            return Ok(());
        }

        // ---- DRAINING ----
        if shared.drain_requested.swap(false, Ordering::SeqCst) {
            let num = shared.queue.discard_interruptible()?;
            debug!("{} drained, {} queued commands discarded", shared.params.name, num);
        }

        // ---- IDLE ----
        let cmd = shared.queue.pop_timeout(IDLE_POLL, || {
            shared.drain_requested.load(Ordering::SeqCst)
                || shared.shutdown_requested.load(Ordering::SeqCst)
        })?;

        match cmd {
            Some(Command::WaitFor(other)) => wait_for_joint(shared, &other)?,
            Some(Command::Rotate(target)) => {
                let result = run_rotation(shared, target, true)?;
                trace!("{} rotation to {} ended: {:?}", shared.params.name, target, result);
            }
            Some(Command::Home(target)) => {
                let result = run_rotation(shared, target, false)?;
                trace!("{} homing to {} ended: {:?}", shared.params.name, target, result);
            }
            None => continue,
        }

        shared.queue.task_done()?;
    }
}

/// Block until the other joint's queue drains, or until this joint is told to drain or stop.
fn wait_for_joint(shared: &Shared, other: &Shared) -> Result<(), JointError> {
    debug!("{} waiting for {}", shared.params.name, other.params.name);

    loop {
        if other.wait_idle(Some(IDLE_POLL))? {
            return Ok(());
        }

        if shared.drain_requested.load(Ordering::SeqCst)
            || shared.shutdown_requested.load(Ordering::SeqCst)
        {
            debug!(
                "{} stopped waiting for {} early",
                shared.params.name, other.params.name
            );
            return Ok(());
        }
    }
}

// ---- STEPPING ----
fn run_rotation(shared: &Shared, target: f64, interruptible: bool) -> Result<Motion, JointError> {
    let start = clamp_angle(shared.servo.lock()?.angle());
    let plan = StepPlan::new(start, target, shared.params.step_size_deg);
    let interval = shared.params.step_interval();

    debug!(
        "{} rotating {} -> {} in {} steps",
        shared.params.name,
        start,
        target,
        plan.len()
    );

    for angle in plan {
        if interruptible && shared.drain_requested.load(Ordering::SeqCst) {
            debug!("{} rotation to {} interrupted", shared.params.name, target);
            return Ok(Motion::Drained);
        }

        // Only hold the servo while writing, get_angle must stay responsive during the sleep
        let write = shared.servo.lock()?.set_angle(angle);
        if let Err(e) = write {
            warn!(
                "{} failed to move to {}, abandoning rotation to {}: {}",
                shared.params.name, angle, target, e
            );
            return Ok(Motion::Failed);
        }

        thread::sleep(interval);
    }

    if shared.log_rotations.load(Ordering::Relaxed) {
        info!(
            "{} performed movement to: {}",
            shared.params.name,
            shared.servo.lock()?.angle()
        );
    }

    Ok(Motion::Complete)
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);

        // Wake anyone joining on this worker
        if self.0.queue.notify().is_err() {
            warn!("{} queue poisoned while stopping", self.0.params.name);
        }
    }
}
