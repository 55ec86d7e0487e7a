//! # Joint Controller
//!
//! Drives a single joint of the arm. Rotations are placed on a command queue and executed by a
//! background worker thread, which moves the servo towards each target in small, evenly paced
//! steps. Callers never touch the servo directly, they only submit commands and wait on them.
//!
//! Motion can be interrupted at any time with [`JointCtrl::dump`], which discards everything
//! queued and stops the current rotation at whatever step it has reached.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod queue;
mod steps;
mod worker;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};

use crate::servo_ctrl::{clamp_angle, ServoDriver};

pub use params::JointParams;
pub use steps::StepPlan;

use self::{
    queue::{CmdQueue, Command},
    worker::worker_thread,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Controller for a single joint of the arm.
pub struct JointCtrl {
    shared: Arc<Shared>,
}

/// State shared between a joint's controller, its worker and any other joint waiting on it.
pub(crate) struct Shared {
    pub params: JointParams,

    pub servo: Mutex<Box<dyn ServoDriver>>,
    pub queue: CmdQueue,
    worker_jh: Mutex<Option<JoinHandle<()>>>,

    pub running: AtomicBool,
    pub accepting: AtomicBool,
    pub drain_requested: AtomicBool,
    pub shutdown_requested: AtomicBool,
    pub log_rotations: AtomicBool,

    /// Bumped on every start, so a shutdown aimed at one worker can't touch its successor.
    generation: AtomicUsize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during JointCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum JointError {
    #[error("{joint} rotation out of bounds: {angle} not in [{min}, {max}]")]
    OutOfBounds {
        joint: String,
        angle: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} is shutting down and can't accept new commands")]
    ShuttingDown(String),

    #[error("{0} wasn't running")]
    NotStarted(String),

    #[error("{0} is already started")]
    AlreadyStarted(String),

    #[error("{0} can't wait for its own queue")]
    SelfDependency(String),

    #[error("Invalid joint parameters: {0}")]
    InvalidParams(String),

    #[error("Couldn't spawn a thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("Sync primitive is poisoned")]
    PoisonError,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointCtrl {
    /// Create a new joint controller driving the given servo.
    ///
    /// The worker isn't started until [`JointCtrl::start`] is called, commands submitted before
    /// then are queued and run once it starts.
    pub fn new(params: JointParams, servo: Box<dyn ServoDriver>) -> Result<Self, JointError> {
        params.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                params,
                servo: Mutex::new(servo),
                queue: CmdQueue::new(),
                worker_jh: Mutex::new(None),
                running: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
                drain_requested: AtomicBool::new(false),
                shutdown_requested: AtomicBool::new(false),
                log_rotations: AtomicBool::new(false),
                generation: AtomicUsize::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.params.name
    }

    /// The joint's bounds and stepping parameters.
    pub fn params(&self) -> &JointParams {
        &self.shared.params
    }

    // ---- START & SHUTDOWN ----

    /// Start the worker thread which executes queued commands.
    pub fn start(&self) -> Result<&Self, JointError> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(JointError::AlreadyStarted(self.name().into()));
        }

        let mut jh = self.shared.worker_jh.lock()?;

        // Reap the previous worker, it has already exited since running was false
        if let Some(old) = jh.take() {
            if old.join().is_err() {
                warn!("{}'s previous worker panicked", self.name());
            }
        }

        // A shutdown racing the previous worker's exit may have left flags behind
        self.shared.shutdown_requested.store(false, Ordering::SeqCst);
        self.shared.drain_requested.store(false, Ordering::SeqCst);
        self.shared.accepting.store(true, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("joint_ctrl::{}", self.name()))
            .spawn(move || worker_thread(shared));

        match spawned {
            Ok(h) => *jh = Some(h),
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(JointError::ThreadSpawn(e));
            }
        }

        Ok(self)
    }

    /// Stop accepting commands, let the queue finish, optionally move to a final angle, then stop
    /// the worker. Blocks until the worker has exited.
    ///
    /// ## Arguments
    /// - `final_angle` - If given the last rotation before shutting down will be to this angle.
    ///   This rotation is never discarded, even when `drain` is set.
    /// - `drain` - If true the current rotation and all queued rotations are cancelled instead of
    ///   being waited for.
    pub fn shutdown(&self, final_angle: Option<f64>, drain: bool) -> Result<&Self, JointError> {
        let generation = self.begin_shutdown(final_angle)?;
        self.shared.finish_shutdown(final_angle, drain, generation)?;
        self.join(None)?;

        Ok(self)
    }

    /// As [`JointCtrl::shutdown`] but the shutdown runs on a background thread and this returns
    /// immediately. Use [`JointCtrl::join`] to wait for the worker to exit.
    pub fn finish_and_shutdown(
        &self,
        final_angle: Option<f64>,
        drain: bool,
    ) -> Result<&Self, JointError> {
        let generation = self.begin_shutdown(final_angle)?;

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("joint_ctrl::{}::shutdown", self.name()))
            .spawn(move || {
                if let Err(e) = shared.finish_shutdown(final_angle, drain, generation) {
                    warn!("{} failed to shut down: {}", shared.params.name, e);
                }
            });

        if let Err(e) = spawned {
            self.shared.accepting.store(true, Ordering::SeqCst);
            return Err(JointError::ThreadSpawn(e));
        }

        Ok(self)
    }

    /// Stop the worker at the start of its next cycle without waiting for queued commands. Any
    /// commands still queued are discarded.
    pub fn stop(&self) -> Result<&Self, JointError> {
        if !self.is_running() {
            return Err(JointError::NotStarted(self.name().into()));
        }

        info!("{} stopping", self.name());
        self.shared.shutdown_requested.store(true, Ordering::SeqCst);
        self.shared.queue.notify()?;

        Ok(self)
    }

    /// Block until the worker thread has exited.
    ///
    /// With a `timeout` this gives up once it expires without raising an error, returning whether
    /// the worker actually exited.
    pub fn join(&self, timeout: Option<Duration>) -> Result<bool, JointError> {
        let shared = &self.shared;
        let exited = shared
            .queue
            .wait_until(timeout, |_| !shared.running.load(Ordering::SeqCst))?;

        if exited {
            if let Some(jh) = shared.worker_jh.lock()?.take() {
                if jh.join().is_err() {
                    warn!("{}'s worker panicked", self.name());
                }
            }
        }

        Ok(exited)
    }

    // ---- ADD ROTATION TO QUEUE ----

    /// Queue a rotation to the given absolute angle.
    ///
    /// Fails without queueing anything if the angle is outside the joint's bounds or if the joint
    /// is shutting down.
    ///
    /// Units: degrees
    pub fn rotate(&self, angle: f64) -> Result<&Self, JointError> {
        self.check_accepting()?;
        self.check_bounds(angle)?;

        self.shared.queue.put(Command::Rotate(angle))?;

        Ok(self)
    }

    /// Queue a rotation to a position given as a fraction between 0 (min) and 1 (max) of the
    /// joint's range.
    pub fn rotate_relative(&self, fraction: f64) -> Result<&Self, JointError> {
        self.rotate(self.shared.params.resolve_relative(fraction))
    }

    /// Queue a rotation by `offset` degrees from the joint's current angle.
    pub fn step(&self, offset: f64) -> Result<&Self, JointError> {
        self.rotate(self.get_angle()? + offset)
    }

    /// Queue a rotation to the joint's default angle.
    pub fn to_default(&self) -> Result<&Self, JointError> {
        self.rotate(self.shared.params.default_angle_deg)
    }

    // ---- WAIT ----

    /// Block until every command queued so far has finished.
    ///
    /// Returns straight away if the worker isn't running, since nothing would ever finish.
    pub fn wait(&self) -> Result<&Self, JointError> {
        self.shared.wait_idle(None)?;

        Ok(self)
    }

    /// Make this joint's worker wait for each of the other joints to empty their queues before it
    /// executes any command queued after this call.
    ///
    /// The dependency applies once, at its place in the queue. Joints must never wait on each
    /// other in a cycle.
    pub fn wait_for(&self, others: &[&JointCtrl]) -> Result<&Self, JointError> {
        self.check_accepting()?;

        if others.iter().any(|o| Arc::ptr_eq(&o.shared, &self.shared)) {
            return Err(JointError::SelfDependency(self.name().into()));
        }

        for other in others {
            self.shared
                .queue
                .put(Command::WaitFor(other.shared.clone()))?;
        }

        Ok(self)
    }

    // ---- MISC ----

    /// Stop the current rotation and discard every queued command.
    ///
    /// The worker stops at whichever step it has reached, the joint doesn't snap back or finish
    /// the motion.
    pub fn dump(&self) -> &Self {
        debug!("{} drain requested", self.name());
        self.shared.drain_requested.store(true, Ordering::SeqCst);

        if self.shared.queue.notify().is_err() {
            warn!("{} queue poisoned while draining", self.name());
        }

        self
    }

    /// The joint's current angle, clamped to the servo range.
    ///
    /// Units: degrees
    pub fn get_angle(&self) -> Result<f64, JointError> {
        Ok(clamp_angle(self.shared.servo.lock()?.angle()))
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether new commands are currently accepted.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Number of commands waiting to be executed, excluding the one in progress.
    pub fn queue_len(&self) -> Result<usize, JointError> {
        self.shared.queue.len()
    }

    /// Log every completed rotation at info level.
    pub fn set_log_rotations(&self, enabled: bool) -> &Self {
        self.shared.log_rotations.store(enabled, Ordering::Relaxed);
        self
    }

    fn check_accepting(&self) -> Result<(), JointError> {
        if !self.is_accepting() {
            return Err(JointError::ShuttingDown(self.name().into()));
        }

        Ok(())
    }

    fn check_bounds(&self, angle: f64) -> Result<(), JointError> {
        let p = &self.shared.params;

        if !p.contains(angle) {
            return Err(JointError::OutOfBounds {
                joint: p.name.clone(),
                angle,
                min: p.min_angle_deg,
                max: p.max_angle_deg,
            });
        }

        Ok(())
    }

    /// Checks common to both shutdown flavours, after which no new commands are accepted.
    ///
    /// Returns the generation of the worker being shut down.
    fn begin_shutdown(&self, final_angle: Option<f64>) -> Result<usize, JointError> {
        let generation = self.shared.generation.load(Ordering::SeqCst);

        if !self.is_running() {
            return Err(JointError::NotStarted(self.name().into()));
        }

        if let Some(angle) = final_angle {
            self.check_bounds(angle)?;
        }

        if self
            .shared
            .accepting
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(JointError::ShuttingDown(self.name().into()));
        }

        info!(
            "{} shutting down (final angle: {:?})",
            self.name(),
            final_angle
        );

        Ok(generation)
    }
}

impl Drop for JointCtrl {
    fn drop(&mut self) {
        // Don't leave an orphaned worker polling forever
        if self.is_running() {
            self.shared.shutdown_requested.store(true, Ordering::SeqCst);
        }
    }
}

impl Shared {
    /// Block until every queued command has finished and any requested drain has been handled,
    /// or the worker isn't running. Returns false if `timeout` expired first.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> Result<bool, JointError> {
        self.queue.wait_until(timeout, |unfinished| {
            let idle = unfinished == 0 && !self.drain_requested.load(Ordering::SeqCst);
            idle || !self.running.load(Ordering::SeqCst)
        })
    }

    /// The blocking part of a shutdown, run after new commands have been refused.
    ///
    /// Only acts on the worker of the given generation. If that worker has already exited (it was
    /// stopped, for example) nothing is requested of it and commands are accepted again.
    fn finish_shutdown(
        &self,
        final_angle: Option<f64>,
        drain: bool,
        generation: usize,
    ) -> Result<(), JointError> {
        let same_worker = || self.generation.load(Ordering::SeqCst) == generation;
        let alive = || same_worker() && self.running.load(Ordering::SeqCst);

        if drain && alive() {
            self.drain_requested.store(true, Ordering::SeqCst);
            self.queue.notify()?;
        }

        self.wait_idle(None)?;

        if let Some(angle) = final_angle {
            if alive() {
                self.queue.put(Command::Home(angle))?;
                self.wait_idle(None)?;
            }
        }

        if alive() {
            self.shutdown_requested.store(true, Ordering::SeqCst);
            self.queue.notify()?;
        } else if same_worker() {
            // The worker reset its flags on exit before our refusal landed
            debug!("{} had already stopped", self.params.name);
            self.accepting.store(true, Ordering::SeqCst);
        }

        Ok(())
    }
}

impl<G> From<PoisonError<G>> for JointError {
    fn from(_: PoisonError<G>) -> Self {
        Self::PoisonError
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
