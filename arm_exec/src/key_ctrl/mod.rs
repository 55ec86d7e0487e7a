//! # Key Control
//!
//! Manual control of the arm from the keyboard. A background thread reads keys from a
//! [`KeySource`] and looks each one up in the bindings from [`KeyCtrlParams`]:
//!
//! | Default key | Action                          |
//! |-------------|---------------------------------|
//! | `q` / `a`   | Step the base up / down         |
//! | `e` / `d`   | Step the vertical arm up / down |
//! | `w` / `s`   | Step the horizontal arm         |
//! | `r` / `f`   | Step the clutch                 |
//! | `t` / `g`   | Increase / decrease step size   |
//! | `b`         | Move every joint to default     |
//! | `c`         | Clear all queues                |
//! | `k`, Esc    | Home and shut the arm down      |

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod source;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::arm_ctrl::{ArmCtrl, ArmError, JointId};

pub use source::{KeySource, ReadlineKeys, ScriptedKeys};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// The escape key, which always shuts the arm down.
pub const ESCAPE: char = '\u{1b}';

/// Smallest manual step size.
///
/// Units: degrees
pub const MIN_STEP_SIZE_DEG: f64 = 1.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Key bindings for manual control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyCtrlParams {
    pub base_up: char,
    pub base_down: char,
    pub vertical_up: char,
    pub vertical_down: char,
    pub horizontal_up: char,
    pub horizontal_down: char,
    pub clutch_up: char,
    pub clutch_down: char,

    pub step_size_up: char,
    pub step_size_down: char,

    pub home: char,
    pub clear: char,
    pub shutdown: char,

    /// Step size used when key control starts, changed in steps of one degree with the step size
    /// keys.
    ///
    /// Units: degrees
    pub default_step_size_deg: f64,
}

/// Drives the arm from keystrokes.
pub struct KeyCtrl {
    arm: Arc<ArmCtrl>,
    params: KeyCtrlParams,
    step_size_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    StepUp(JointId),
    StepDown(JointId),
    IncreaseStepSize,
    DecreaseStepSize,
    Home,
    ClearQueues,
    Shutdown,
}

/// Why key control stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitReason {
    /// The arm was no longer running.
    ArmStopped,

    /// The shutdown key was pressed and the arm has been shut down.
    ShutdownRequested,

    /// The key source ran out of keys.
    InputClosed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl KeyCtrlParams {
    /// Action bound to the given key, if any.
    pub fn action(&self, key: char) -> Option<KeyAction> {
        use KeyAction::*;

        let bindings = [
            (self.base_up, StepUp(JointId::Base)),
            (self.base_down, StepDown(JointId::Base)),
            (self.vertical_up, StepUp(JointId::Vertical)),
            (self.vertical_down, StepDown(JointId::Vertical)),
            (self.horizontal_up, StepUp(JointId::Horizontal)),
            (self.horizontal_down, StepDown(JointId::Horizontal)),
            (self.clutch_up, StepUp(JointId::Clutch)),
            (self.clutch_down, StepDown(JointId::Clutch)),
            (self.step_size_up, IncreaseStepSize),
            (self.step_size_down, DecreaseStepSize),
            (self.home, Home),
            (self.clear, ClearQueues),
            (self.shutdown, Shutdown),
            (ESCAPE, Shutdown),
        ];

        bindings
            .iter()
            .find(|(bound, _)| *bound == key)
            .map(|(_, action)| *action)
    }
}

impl Default for KeyCtrlParams {
    fn default() -> Self {
        Self {
            base_up: 'q',
            base_down: 'a',
            vertical_up: 'e',
            vertical_down: 'd',
            horizontal_up: 'w',
            horizontal_down: 's',
            clutch_up: 'r',
            clutch_down: 'f',
            step_size_up: 't',
            step_size_down: 'g',
            home: 'b',
            clear: 'c',
            shutdown: 'k',
            default_step_size_deg: 5.0,
        }
    }
}

impl KeyCtrl {
    pub fn new(arm: Arc<ArmCtrl>, params: &KeyCtrlParams) -> Self {
        Self {
            arm,
            step_size_deg: params.default_step_size_deg.max(MIN_STEP_SIZE_DEG),
            params: params.clone(),
        }
    }

    /// Current manual step size.
    ///
    /// Units: degrees
    pub fn step_size(&self) -> f64 {
        self.step_size_deg
    }

    /// Run key control on a background thread until it exits.
    pub fn spawn(
        mut self,
        mut source: Box<dyn KeySource>,
    ) -> std::io::Result<JoinHandle<ExitReason>> {
        thread::Builder::new()
            .name("key_ctrl".into())
            .spawn(move || self.run(source.as_mut()))
    }

    /// Handle keys from the source until the arm stops, the arm is shut down from the keyboard or
    /// the source runs dry.
    pub fn run(&mut self, source: &mut dyn KeySource) -> ExitReason {
        info!("Key control started");

        let reason = loop {
            if !self.arm.is_running() {
                break ExitReason::ArmStopped;
            }

            let key = match source.next_key() {
                Some(k) => k,
                None => break ExitReason::InputClosed,
            };

            match self.params.action(key) {
                Some(KeyAction::Shutdown) => {
                    self.shutdown();
                    break ExitReason::ShutdownRequested;
                }
                Some(action) => {
                    if let Err(e) = self.handle(action) {
                        warn!("Couldn't handle {:?}: {}", action, e);
                    }
                }
                None => trace!("Ignoring unbound key {:?}", key),
            }
        };

        info!("Key control stopped: {:?}", reason);

        reason
    }

    /// Perform a single action. [`KeyAction::Shutdown`] blocks until the arm has stopped.
    pub fn handle(&mut self, action: KeyAction) -> Result<(), ArmError> {
        debug!("Key action: {:?}", action);

        match action {
            KeyAction::StepUp(id) => self.step(id, self.step_size_deg)?,
            KeyAction::StepDown(id) => self.step(id, -self.step_size_deg)?,
            KeyAction::IncreaseStepSize => {
                self.step_size_deg += 1.0;
                info!("Step size increased to {}", self.step_size_deg);
            }
            KeyAction::DecreaseStepSize => {
                self.step_size_deg = (self.step_size_deg - 1.0).max(MIN_STEP_SIZE_DEG);
                info!("Step size decreased to {}", self.step_size_deg);
            }
            KeyAction::Home => {
                self.arm.to_default()?;
                info!("Moving to default");
            }
            KeyAction::ClearQueues => {
                self.arm.clear_all_queues();
                info!("Cleared all rotations");
            }
            KeyAction::Shutdown => self.shutdown(),
        }

        Ok(())
    }

    /// Wait for the joint to settle, then move it by `offset` without leaving its bounds.
    fn step(&self, id: JointId, offset: f64) -> Result<(), ArmError> {
        let joint = self.arm.joint(id);

        joint.wait()?;
        let target = joint.params().clamp(joint.get_angle()? + offset);
        joint.rotate(target)?;

        Ok(())
    }

    fn shutdown(&self) {
        info!("Shutting down the arm");

        if let Err(e) = self.arm.to_default_and_shutdown(true) {
            warn!("Arm shutdown failed to start cleanly: {}", e);
        }

        match self.arm.join(None) {
            Ok(_) => info!("Arm shut down"),
            Err(e) => warn!("Couldn't wait for the arm to shut down: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm_ctrl::ArmParams;
    use std::time::Duration;

    fn started_arm() -> Arc<ArmCtrl> {
        let mut params = ArmParams::default();
        params.base.step_interval_s = 0.0;
        params.vertical.step_interval_s = 0.0;
        params.horizontal.step_interval_s = 0.0;
        params.clutch.step_interval_s = 0.0;

        let arm = Arc::new(ArmCtrl::new_sim(params).unwrap());
        arm.start().unwrap();
        arm
    }

    fn stop(arm: &ArmCtrl) {
        arm.stop().ok();
        arm.join(Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_default_bindings() {
        let params = KeyCtrlParams::default();

        assert_eq!(params.action('q'), Some(KeyAction::StepUp(JointId::Base)));
        assert_eq!(params.action('d'), Some(KeyAction::StepDown(JointId::Vertical)));
        assert_eq!(params.action('w'), Some(KeyAction::StepUp(JointId::Horizontal)));
        assert_eq!(params.action('f'), Some(KeyAction::StepDown(JointId::Clutch)));
        assert_eq!(params.action('t'), Some(KeyAction::IncreaseStepSize));
        assert_eq!(params.action('b'), Some(KeyAction::Home));
        assert_eq!(params.action('c'), Some(KeyAction::ClearQueues));
        assert_eq!(params.action('k'), Some(KeyAction::Shutdown));
        assert_eq!(params.action(ESCAPE), Some(KeyAction::Shutdown));
        assert_eq!(params.action('z'), None);
    }

    #[test]
    fn test_rebound_keys_from_toml() {
        let params: KeyCtrlParams =
            toml::from_str("shutdown = \"x\"\ndefault_step_size_deg = 2.0\n").unwrap();
        assert_eq!(params.action('x'), Some(KeyAction::Shutdown));
        assert_eq!(params.action('k'), None);
        assert_eq!(params.action('q'), Some(KeyAction::StepUp(JointId::Base)));
        assert_eq!(params.default_step_size_deg, 2.0);
    }

    #[test]
    fn test_steps_are_clamped_to_joint_bounds() {
        let arm = started_arm();
        let mut ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());

        // Base starts at 90, steps of 5
        let mut keys = ScriptedKeys::new("qqaaa");
        assert_eq!(ctrl.run(&mut keys), ExitReason::InputClosed);
        arm.wait_for_all().unwrap();
        assert_eq!(arm.base().get_angle().unwrap(), 85.0);

        // Vertical starts at its max of 180
        ctrl.run(&mut ScriptedKeys::new("e"));
        arm.wait_for_all().unwrap();
        assert_eq!(arm.vertical().get_angle().unwrap(), 180.0);

        // Horizontal starts at its min of 0
        ctrl.run(&mut ScriptedKeys::new("ss"));
        arm.wait_for_all().unwrap();
        assert_eq!(arm.horizontal().get_angle().unwrap(), 0.0);

        stop(&arm);
    }

    #[test]
    fn test_step_size_never_below_one() {
        let arm = started_arm();
        let mut ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());
        assert_eq!(ctrl.step_size(), 5.0);

        ctrl.run(&mut ScriptedKeys::new("tt"));
        assert_eq!(ctrl.step_size(), 7.0);

        ctrl.run(&mut ScriptedKeys::new("gggggggggg"));
        assert_eq!(ctrl.step_size(), 1.0);

        ctrl.run(&mut ScriptedKeys::new("r"));
        arm.wait_for_all().unwrap();
        assert_eq!(arm.clutch().get_angle().unwrap(), 61.0);

        stop(&arm);
    }

    #[test]
    fn test_unknown_keys_and_home() {
        let arm = started_arm();
        let mut ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());

        ctrl.run(&mut ScriptedKeys::new("zq?!w"));
        arm.wait_for_all().unwrap();
        assert_eq!(arm.base().get_angle().unwrap(), 95.0);
        assert_eq!(arm.horizontal().get_angle().unwrap(), 5.0);

        ctrl.run(&mut ScriptedKeys::new("b"));
        arm.wait_for_all().unwrap();
        assert_eq!(arm.base().get_angle().unwrap(), 90.0);
        assert_eq!(arm.horizontal().get_angle().unwrap(), 0.0);

        stop(&arm);
    }

    #[test]
    fn test_shutdown_key_homes_and_stops() {
        let arm = started_arm();
        let ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());

        let jh = ctrl
            .spawn(Box::new(ScriptedKeys::new("qqqk")))
            .unwrap();
        assert_eq!(jh.join().unwrap(), ExitReason::ShutdownRequested);

        assert!(!arm.is_running());
        assert_eq!(arm.base().get_angle().unwrap(), 90.0);

        // Keys after the arm has stopped are never read
        let mut ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());
        let mut keys = ScriptedKeys::new("q");
        assert_eq!(ctrl.run(&mut keys), ExitReason::ArmStopped);
        assert_eq!(keys.next_key(), Some('q'));
    }

    #[test]
    fn test_escape_shuts_down() {
        let arm = started_arm();
        let mut ctrl = KeyCtrl::new(arm.clone(), &KeyCtrlParams::default());

        assert_eq!(
            ctrl.run(&mut ScriptedKeys::new("\u{1b}q")),
            ExitReason::ShutdownRequested
        );
        assert!(!arm.is_running());
    }
}
