//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::{ArmError, JointId};
use crate::{joint_ctrl::JointParams, key_ctrl::KeyCtrlParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Arm control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmParams {
    // ---- JOINTS ----
    /// The rotating base.
    pub base: JointParams,

    /// The arm joint moving the gripper up and down.
    pub vertical: JointParams,

    /// The arm joint moving the gripper towards and away from the base.
    pub horizontal: JointParams,

    /// The gripper clutch.
    pub clutch: JointParams,

    // ---- CLUTCH POSITIONS ----
    /// Clutch angle which closes the gripper on an object.
    ///
    /// Units: degrees
    pub clutch_grab_angle_deg: f64,

    /// Clutch angle which opens the gripper.
    ///
    /// Units: degrees
    pub clutch_release_angle_deg: f64,

    // ---- MANUAL CONTROL ----
    #[serde(default)]
    pub key_ctrl: KeyCtrlParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmParams {
    /// Parameters of the given joint.
    pub fn joint(&self, id: JointId) -> &JointParams {
        match id {
            JointId::Base => &self.base,
            JointId::Vertical => &self.vertical,
            JointId::Horizontal => &self.horizontal,
            JointId::Clutch => &self.clutch,
        }
    }

    /// Check every joint and the clutch positions.
    pub fn validate(&self) -> Result<(), ArmError> {
        for id in JointId::ALL.iter() {
            self.joint(*id).validate()?;
        }

        for (what, angle) in [
            ("grab", self.clutch_grab_angle_deg),
            ("release", self.clutch_release_angle_deg),
        ]
        .iter()
        {
            if !self.clutch.contains(*angle) {
                return Err(ArmError::InvalidParams(format!(
                    "clutch {} angle {} outside of [{}, {}]",
                    what, angle, self.clutch.min_angle_deg, self.clutch.max_angle_deg
                )));
            }
        }

        Ok(())
    }
}

impl Default for ArmParams {
    /// The Eezybot MK2 layout, with the horizontal arm on channel 1 and the vertical on 2.
    fn default() -> Self {
        let joint = |name: &str, channel, min, default, max| JointParams {
            name: name.into(),
            channel,
            min_angle_deg: min,
            max_angle_deg: max,
            default_angle_deg: default,
            step_size_deg: 1.0,
            step_interval_s: 0.02,
        };

        Self {
            base: joint("Base", 0, 0.0, 90.0, 180.0),
            horizontal: joint("Horizontal Arm", 1, 0.0, 0.0, 125.0),
            vertical: joint("Vertical Arm", 2, 0.0, 180.0, 180.0),
            clutch: joint("Clutch", 3, 0.0, 60.0, 180.0),
            clutch_grab_angle_deg: 35.0,
            clutch_release_angle_deg: 60.0,
            key_ctrl: KeyCtrlParams::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ArmParams::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_clutch_positions() {
        let mut params = ArmParams::default();
        params.clutch.min_angle_deg = 40.0;
        assert!(matches!(params.validate(), Err(ArmError::InvalidParams(_))));
    }

    #[test]
    fn test_invalid_joint() {
        let mut params = ArmParams::default();
        params.vertical.step_size_deg = -1.0;
        assert!(matches!(params.validate(), Err(ArmError::Joint(_))));
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            clutch_grab_angle_deg = 35.0
            clutch_release_angle_deg = 60.0

            [base]
            name = "Base"
            channel = 0
            min_angle_deg = 0.0
            max_angle_deg = 180.0
            default_angle_deg = 90.0
            step_size_deg = 1.0
            step_interval_s = 0.02

            [vertical]
            name = "Vertical Arm"
            channel = 2
            min_angle_deg = 0.0
            max_angle_deg = 180.0
            default_angle_deg = 180.0
            step_size_deg = 0.5
            step_interval_s = 0.01

            [horizontal]
            name = "Horizontal Arm"
            channel = 1
            min_angle_deg = 0.0
            max_angle_deg = 125.0
            default_angle_deg = 0.0
            step_size_deg = 1.0
            step_interval_s = 0.02

            [clutch]
            name = "Clutch"
            channel = 3
            min_angle_deg = 35.0
            max_angle_deg = 180.0
            default_angle_deg = 60.0
            step_size_deg = 2.0
            step_interval_s = 0.0
        "#;

        let params: ArmParams = toml::from_str(toml_str).unwrap();
        assert!(params.validate().is_ok());
        assert_eq!(params.vertical.step_size_deg, 0.5);
        assert_eq!(params.joint(JointId::Clutch).min_angle_deg, 35.0);

        // Key bindings fall back to the defaults when not given
        assert_eq!(params.key_ctrl.shutdown, 'k');
    }
}
