//! # Arm Coordinator
//!
//! Owns the four joint controllers of the arm and drives operations which involve more than one
//! of them, such as homing the whole arm or shutting every joint down at once.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use util::params::LoadError;

use crate::{
    joint_ctrl::{JointCtrl, JointError},
    servo_ctrl::{Pca9685Params, ServoDriver, ServoError, SimServo},
};

pub use params::ArmParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters file of the arm executables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArmExecParams {
    /// The PWM board driving the servos.
    #[serde(default)]
    pub driver: Pca9685Params,

    pub arm: ArmParams,
}

/// Controller for the whole arm.
pub struct ArmCtrl {
    params: ArmParams,

    base: JointCtrl,
    vertical: JointCtrl,
    horizontal: JointCtrl,
    clutch: JointCtrl,
}

/// Angle of every joint at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmAngles {
    pub base_deg: f64,
    pub vertical_deg: f64,
    pub horizontal_deg: f64,
    pub clutch_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Identifies one of the arm's joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointId {
    Base,
    Vertical,
    Horizontal,
    Clutch,
}

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("Joint error: {0}")]
    Joint(#[from] JointError),

    #[error("Couldn't load the arm parameters: {0}")]
    ParamLoad(#[from] LoadError),

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),

    #[error("Invalid arm parameters: {0}")]
    InvalidParams(String),

    #[error("Couldn't open the I2C bus: {0}")]
    I2cBus(String),

    #[error("No servo hardware is available on this platform, use the simulated servos instead")]
    NoHardware,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointId {
    /// Every joint, in the order servos are given to [`ArmCtrl::new`].
    pub const ALL: [JointId; 4] = [
        JointId::Base,
        JointId::Vertical,
        JointId::Horizontal,
        JointId::Clutch,
    ];
}

impl ArmCtrl {
    /// Create the arm from its parameters and one servo per joint, given in [`JointId::ALL`]
    /// order.
    ///
    /// None of the joints are started.
    pub fn new(params: ArmParams, servos: [Box<dyn ServoDriver>; 4]) -> Result<Self, ArmError> {
        params.validate()?;

        let [base, vertical, horizontal, clutch] = servos;

        Ok(Self {
            base: JointCtrl::new(params.base.clone(), base)?,
            vertical: JointCtrl::new(params.vertical.clone(), vertical)?,
            horizontal: JointCtrl::new(params.horizontal.clone(), horizontal)?,
            clutch: JointCtrl::new(params.clutch.clone(), clutch)?,
            params,
        })
    }

    /// Create an arm driving in-memory servos, each resting at its joint's default angle.
    pub fn new_sim(params: ArmParams) -> Result<Self, ArmError> {
        let servo = |id: JointId| -> Box<dyn ServoDriver> {
            Box::new(SimServo::new(params.joint(id).default_angle_deg))
        };

        let servos = [
            servo(JointId::Base),
            servo(JointId::Vertical),
            servo(JointId::Horizontal),
            servo(JointId::Clutch),
        ];

        Self::new(params, servos)
    }

    /// Create an arm driving the servos plugged into a PCA9685 board.
    ///
    /// The board can't report where the servos are, so each is assumed to start at its joint's
    /// default angle.
    pub fn with_pca9685<I2C, E>(
        params: ArmParams,
        board: &crate::servo_ctrl::Pca9685Board<I2C>,
    ) -> Result<Self, ArmError>
    where
        I2C: embedded_hal::blocking::i2c::Write<Error = E>
            + embedded_hal::blocking::i2c::WriteRead<Error = E>
            + Send
            + 'static,
        E: 'static,
    {
        let servo = |id: JointId| -> Result<Box<dyn ServoDriver>, ArmError> {
            let p = params.joint(id);
            Ok(Box::new(board.servo(p.channel, p.default_angle_deg)?))
        };

        let servos = [
            servo(JointId::Base)?,
            servo(JointId::Vertical)?,
            servo(JointId::Horizontal)?,
            servo(JointId::Clutch)?,
        ];

        Self::new(params, servos)
    }

    /// Create the arm described by an executable's parameters, either in simulation or on the
    /// Raspberry Pi's I2C bus.
    pub fn open(params: &ArmExecParams, sim: bool) -> Result<Self, ArmError> {
        if sim {
            info!("Using simulated servos");
            return Self::new_sim(params.arm.clone());
        }

        Self::open_hardware(params)
    }

    #[cfg(target_arch = "arm")]
    fn open_hardware(params: &ArmExecParams) -> Result<Self, ArmError> {
        let i2c = rppal::i2c::I2c::new().map_err(|e| ArmError::I2cBus(e.to_string()))?;
        let board = crate::servo_ctrl::Pca9685Board::new(i2c, params.driver.clone())?;

        info!("PCA9685 initialised at {:#04x}", params.driver.address);

        Self::with_pca9685(params.arm.clone(), &board)
    }

    #[cfg(not(target_arch = "arm"))]
    fn open_hardware(_params: &ArmExecParams) -> Result<Self, ArmError> {
        Err(ArmError::NoHardware)
    }

    // ---- ACCESSORS ----

    pub fn params(&self) -> &ArmParams {
        &self.params
    }

    pub fn joint(&self, id: JointId) -> &JointCtrl {
        match id {
            JointId::Base => &self.base,
            JointId::Vertical => &self.vertical,
            JointId::Horizontal => &self.horizontal,
            JointId::Clutch => &self.clutch,
        }
    }

    pub fn base(&self) -> &JointCtrl {
        &self.base
    }

    pub fn vertical(&self) -> &JointCtrl {
        &self.vertical
    }

    pub fn horizontal(&self) -> &JointCtrl {
        &self.horizontal
    }

    pub fn clutch(&self) -> &JointCtrl {
        &self.clutch
    }

    fn joints(&self) -> impl Iterator<Item = &JointCtrl> {
        JointId::ALL.iter().map(move |id| self.joint(*id))
    }

    /// Current angle of every joint.
    pub fn angles(&self) -> Result<ArmAngles, ArmError> {
        Ok(ArmAngles {
            base_deg: self.base.get_angle()?,
            vertical_deg: self.vertical.get_angle()?,
            horizontal_deg: self.horizontal.get_angle()?,
            clutch_deg: self.clutch.get_angle()?,
        })
    }

    // ---- LIFECYCLE ----

    /// Start every joint which isn't already running.
    pub fn start(&self) -> Result<&Self, ArmError> {
        for joint in self.joints() {
            match joint.start() {
                Ok(_) | Err(JointError::AlreadyStarted(_)) => (),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self)
    }

    /// True only if all four joints are running.
    pub fn is_running(&self) -> bool {
        self.joints().all(JointCtrl::is_running)
    }

    /// Shut every joint down concurrently, homing each to its default angle on the way.
    ///
    /// Returns once the shutdowns have been launched, use [`ArmCtrl::join`] to wait for them.
    pub fn to_default_and_shutdown(&self, drain: bool) -> Result<&Self, ArmError> {
        let mut angles = [None; 4];
        for (angle, id) in angles.iter_mut().zip(JointId::ALL.iter()) {
            *angle = Some(self.params.joint(*id).default_angle_deg);
        }

        self.finish_and_shutdown(angles, drain)
    }

    /// Shut every joint down concurrently, each optionally moving to a final angle given in
    /// [`JointId::ALL`] order.
    ///
    /// All final angles are checked before any joint is touched. If a joint refuses to shut down
    /// the others are still shut down and the first error is returned.
    pub fn finish_and_shutdown(
        &self,
        final_angles: [Option<f64>; 4],
        drain: bool,
    ) -> Result<&Self, ArmError> {
        for (id, angle) in JointId::ALL.iter().zip(final_angles.iter()) {
            if let Some(angle) = angle {
                let p = self.params.joint(*id);
                if !p.contains(*angle) {
                    return Err(JointError::OutOfBounds {
                        joint: p.name.clone(),
                        angle: *angle,
                        min: p.min_angle_deg,
                        max: p.max_angle_deg,
                    }
                    .into());
                }
            }
        }

        info!("Arm shutting down (drain: {})", drain);

        let mut first_err = None;
        for (joint, angle) in self.joints().zip(final_angles.iter()) {
            if let Err(e) = joint.finish_and_shutdown(*angle, drain) {
                warn!("{} couldn't begin shutting down: {}", joint.name(), e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(self),
        }
    }

    /// Stop every running joint without waiting for its queue.
    pub fn stop(&self) -> Result<&Self, ArmError> {
        for joint in self.joints() {
            match joint.stop() {
                Ok(_) | Err(JointError::NotStarted(_)) => (),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self)
    }

    /// Wait for every joint's worker to exit, sharing one timeout between them.
    ///
    /// Returns whether all of them exited.
    pub fn join(&self, timeout: Option<Duration>) -> Result<bool, ArmError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut all_exited = true;

        for joint in self.joints() {
            let remaining =
                deadline.map(|d| d.saturating_duration_since(Instant::now()));
            all_exited &= joint.join(remaining)?;
        }

        Ok(all_exited)
    }

    // ---- MOTION ----

    /// Queue a move to the default angle on every joint.
    pub fn to_default(&self) -> Result<&Self, ArmError> {
        for joint in self.joints() {
            joint.to_default()?;
        }

        Ok(self)
    }

    /// Block until every joint has finished everything queued so far.
    pub fn wait_for_all(&self) -> Result<&Self, ArmError> {
        for joint in self.joints() {
            joint.wait()?;
        }

        Ok(self)
    }

    /// Interrupt every joint and discard everything queued.
    pub fn clear_all_queues(&self) -> &Self {
        debug!("Clearing all queues");

        for joint in self.joints() {
            joint.dump();
        }

        self
    }

    pub fn set_log_rotations(&self, enabled: bool) -> &Self {
        for joint in self.joints() {
            joint.set_log_rotations(enabled);
        }

        self
    }

    /// Close the clutch on whatever is in the gripper.
    pub fn grab(&self) -> Result<&Self, ArmError> {
        self.clutch.rotate(self.params.clutch_grab_angle_deg)?;
        Ok(self)
    }

    /// Open the clutch.
    pub fn release(&self) -> Result<&Self, ArmError> {
        self.clutch.rotate(self.params.clutch_release_angle_deg)?;
        Ok(self)
    }

    /// Pick up whatever is in front of the arm and put it down to the side.
    ///
    /// Blocks until the object has been grabbed. The carry and release are left queued, the
    /// clutch only opens once the other three joints have reached their drop-off positions.
    pub fn hand_over(&self) -> Result<&Self, ArmError> {
        let (base, vertical, horizontal) = (&self.base, &self.vertical, &self.horizontal);

        info!("Handing over");

        // Reach out over the object
        vertical.rotate(vertical.params().clamp(vertical.get_angle()? + 20.0))?;
        horizontal.rotate(horizontal.params().max_angle_deg)?;
        vertical.wait()?;
        horizontal.wait()?;

        self.grab()?;
        self.clutch.wait()?;

        // Carry it away
        base.rotate(base.params().max_angle_deg)?;
        vertical.to_default()?;
        horizontal.rotate_relative(0.5)?;

        self.clutch.wait_for(&[base, vertical, horizontal])?;
        self.release()?;

        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::WriteLog;
    use std::thread;

    /// Default arm with fast joints so tests don't hang around.
    fn fast_params(step_interval_s: f64) -> ArmParams {
        let mut params = ArmParams::default();
        for id in JointId::ALL.iter() {
            let p = match id {
                JointId::Base => &mut params.base,
                JointId::Vertical => &mut params.vertical,
                JointId::Horizontal => &mut params.horizontal,
                JointId::Clutch => &mut params.clutch,
            };
            p.step_size_deg = 1.0;
            p.step_interval_s = step_interval_s;
        }
        params
    }

    fn sim_arm(params: ArmParams) -> (ArmCtrl, Vec<WriteLog>) {
        let sims: Vec<SimServo> = JointId::ALL
            .iter()
            .map(|id| SimServo::new(params.joint(*id).default_angle_deg))
            .collect();
        let logs = sims.iter().map(SimServo::write_log).collect();

        let mut sims = sims.into_iter();
        let mut next = || -> Box<dyn ServoDriver> { Box::new(sims.next().unwrap()) };
        let servos = [next(), next(), next(), next()];

        (ArmCtrl::new(params, servos).unwrap(), logs)
    }

    #[test]
    fn test_start_and_shutdown() {
        let arm = ArmCtrl::new_sim(fast_params(0.0)).unwrap();
        assert!(!arm.is_running());

        arm.start().unwrap();
        assert!(arm.is_running());

        // Starting again is harmless
        arm.start().unwrap();

        arm.base().rotate(100.0).unwrap();
        arm.to_default_and_shutdown(false).unwrap();
        assert!(arm.join(Some(Duration::from_secs(5))).unwrap());
        assert!(!arm.is_running());

        assert_eq!(arm.base().get_angle().unwrap(), 90.0);

        // Restartable
        arm.start().unwrap();
        assert!(arm.is_running());
        arm.stop().unwrap();
        assert!(arm.join(Some(Duration::from_secs(5))).unwrap());
    }

    #[test]
    fn test_is_running_needs_all_joints() {
        let arm = ArmCtrl::new_sim(fast_params(0.0)).unwrap();
        arm.start().unwrap();

        arm.clutch().stop().unwrap();
        assert!(arm.clutch().join(Some(Duration::from_secs(5))).unwrap());
        assert!(!arm.is_running());

        arm.stop().unwrap();
        arm.join(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_to_default_and_wait_for_all() {
        let (arm, logs) = sim_arm(fast_params(0.0));
        arm.start().unwrap();

        arm.base().rotate(80.0).unwrap();
        arm.horizontal().rotate(10.0).unwrap();
        arm.to_default().unwrap().wait_for_all().unwrap();

        assert_eq!(
            arm.angles().unwrap(),
            ArmAngles {
                base_deg: 90.0,
                vertical_deg: 180.0,
                horizontal_deg: 0.0,
                clutch_deg: 60.0,
            }
        );
        assert_eq!(logs[0].last(), Some(90.0));
        assert_eq!(logs[2].writes().iter().cloned().fold(0.0, f64::max), 10.0);

        arm.stop().unwrap();
        arm.join(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_shutdown_runs_joints_concurrently() {
        // 40 steps of 10 ms per joint, so about 0.4 s each or 1.6 s one after the other
        let arm = ArmCtrl::new_sim(fast_params(0.01)).unwrap();
        arm.base().rotate(110.0).unwrap();
        arm.vertical().rotate(160.0).unwrap();
        arm.horizontal().rotate(20.0).unwrap();
        arm.clutch().rotate(80.0).unwrap();

        let start = Instant::now();
        arm.start().unwrap();
        arm.to_default_and_shutdown(false).unwrap();
        assert!(arm.join(None).unwrap());
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(1200), "took {:?}", elapsed);

        assert_eq!(arm.clutch().get_angle().unwrap(), 60.0);
        assert_eq!(arm.vertical().get_angle().unwrap(), 180.0);
    }

    #[test]
    fn test_finish_and_shutdown_checks_all_angles_first() {
        let arm = ArmCtrl::new_sim(fast_params(0.0)).unwrap();
        arm.start().unwrap();

        // Horizontal is limited to 125
        let result = arm.finish_and_shutdown([Some(10.0), None, Some(150.0), None], false);
        assert!(matches!(
            result,
            Err(ArmError::Joint(JointError::OutOfBounds { .. }))
        ));

        // Nothing was shut down
        assert!(arm.joints().all(JointCtrl::is_accepting));

        arm.finish_and_shutdown([Some(10.0), None, Some(100.0), None], false)
            .unwrap();
        assert!(arm.join(Some(Duration::from_secs(5))).unwrap());
        assert_eq!(arm.base().get_angle().unwrap(), 10.0);
        assert_eq!(arm.horizontal().get_angle().unwrap(), 100.0);
        assert_eq!(arm.vertical().get_angle().unwrap(), 180.0);
    }

    #[test]
    fn test_join_timeout_is_shared() {
        let arm = ArmCtrl::new_sim(fast_params(0.0)).unwrap();
        arm.start().unwrap();

        let start = Instant::now();
        assert!(!arm.join(Some(Duration::from_millis(100))).unwrap());
        assert!(start.elapsed() < Duration::from_millis(400));

        arm.stop().unwrap();
        assert!(arm.join(Some(Duration::from_secs(5))).unwrap());
    }

    #[test]
    fn test_clear_all_queues() {
        let arm = ArmCtrl::new_sim(fast_params(0.01)).unwrap();
        arm.start().unwrap();

        arm.base().rotate(0.0).unwrap().rotate(180.0).unwrap();
        arm.vertical().rotate(0.0).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        arm.clear_all_queues().wait_for_all().unwrap();

        // Stopped part of the way through the first rotations
        let base = arm.base().get_angle().unwrap();
        assert!(base < 90.0 && base > 0.0, "base at {}", base);
        assert!(arm.vertical().get_angle().unwrap() > 0.0);
        assert_eq!(arm.base().queue_len().unwrap(), 0);

        arm.stop().unwrap();
        arm.join(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_grab_release_and_hand_over() {
        let (arm, logs) = sim_arm(fast_params(0.005));
        arm.start().unwrap();

        arm.grab().unwrap().wait_for_all().unwrap();
        assert_eq!(arm.clutch().get_angle().unwrap(), 35.0);
        arm.release().unwrap().wait_for_all().unwrap();
        assert_eq!(arm.clutch().get_angle().unwrap(), 60.0);
        logs[3].clear();

        // Vertical starts at its max so can't go any higher
        arm.hand_over().unwrap();

        // Returns holding the object, with the carry still under way
        assert_eq!(arm.clutch().get_angle().unwrap(), 35.0);
        assert!(arm.base().get_angle().unwrap() < 180.0);

        // The clutch only lets go once the other joints reached the drop-off
        let deadline = Instant::now() + Duration::from_secs(10);
        while arm.clutch().get_angle().unwrap() <= 35.0 {
            assert!(Instant::now() < deadline, "clutch never released");
            thread::sleep(Duration::from_millis(1));
        }
        let at_release = arm.angles().unwrap();
        assert_eq!(at_release.base_deg, 180.0);
        assert_eq!(at_release.vertical_deg, 180.0);
        assert_eq!(at_release.horizontal_deg, 62.5);

        arm.wait_for_all().unwrap();

        let angles = arm.angles().unwrap();
        assert_eq!(angles.base_deg, 180.0);
        assert_eq!(angles.vertical_deg, 180.0);
        assert_eq!(angles.horizontal_deg, 62.5);
        assert_eq!(angles.clutch_deg, 60.0);

        // Horizontal reached out fully before coming back to the middle
        assert!(logs[2].writes().contains(&125.0));

        // Clutch closed then opened again
        let clutch = logs[3].writes();
        assert!(clutch.contains(&35.0));
        assert_eq!(clutch.last(), Some(&60.0));

        arm.stop().unwrap();
        arm.join(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_open_sim() {
        let arm = ArmCtrl::open(&ArmExecParams::default(), true).unwrap();
        assert_eq!(arm.joint(JointId::Horizontal).params().max_angle_deg, 125.0);
        assert_eq!(arm.base().get_angle().unwrap(), 90.0);
    }
}
