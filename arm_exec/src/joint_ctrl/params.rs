//! Parameters structure for a single joint

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::JointError;
use crate::servo_ctrl::{SERVO_MAX_ANGLE_DEG, SERVO_MIN_ANGLE_DEG};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of one joint of the arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointParams {
    /// Human readable name used in logs and errors
    pub name: String,

    /// Channel of the servo driver board the joint's servo is plugged into
    pub channel: u8,

    /// Lowest angle the joint may be commanded to.
    ///
    /// Units: degrees
    pub min_angle_deg: f64,

    /// Highest angle the joint may be commanded to.
    ///
    /// Units: degrees
    pub max_angle_deg: f64,

    /// Default SAFE position of the joint, used for homing.
    ///
    /// Units: degrees
    pub default_angle_deg: f64,

    /// Size of a single micro-step of a rotation.
    ///
    /// Units: degrees
    pub step_size_deg: f64,

    /// Time to wait after each micro-step.
    ///
    /// Units: seconds
    pub step_interval_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointParams {
    /// Check the parameters describe a joint that can actually be driven.
    pub fn validate(&self) -> Result<(), JointError> {
        let invalid = |msg: String| Err(JointError::InvalidParams(format!("{}: {}", self.name, msg)));

        let angles = [self.min_angle_deg, self.default_angle_deg, self.max_angle_deg];
        if angles.iter().any(|a| !a.is_finite()) {
            return invalid("angles must be finite".into());
        }

        if self.min_angle_deg < SERVO_MIN_ANGLE_DEG || self.max_angle_deg > SERVO_MAX_ANGLE_DEG {
            return invalid(format!(
                "bounds [{}, {}] exceed the servo range [{}, {}]",
                self.min_angle_deg, self.max_angle_deg, SERVO_MIN_ANGLE_DEG, SERVO_MAX_ANGLE_DEG
            ));
        }

        if !(self.min_angle_deg <= self.default_angle_deg
            && self.default_angle_deg <= self.max_angle_deg)
        {
            return invalid(format!(
                "expected min <= default <= max, found {} <= {} <= {}",
                self.min_angle_deg, self.default_angle_deg, self.max_angle_deg
            ));
        }

        if !(self.step_size_deg.is_finite() && self.step_size_deg > 0.0) {
            return invalid(format!("step size must be > 0, found {}", self.step_size_deg));
        }

        if !(self.step_interval_s.is_finite() && self.step_interval_s >= 0.0) {
            return invalid(format!(
                "step interval must be >= 0, found {}",
                self.step_interval_s
            ));
        }

        Ok(())
    }

    /// Whether the angle is within the joint's bounds.
    pub fn contains(&self, angle_deg: f64) -> bool {
        (self.min_angle_deg..=self.max_angle_deg).contains(&angle_deg)
    }

    /// Clamp the angle into the joint's bounds.
    pub fn clamp(&self, angle_deg: f64) -> f64 {
        angle_deg.max(self.min_angle_deg).min(self.max_angle_deg)
    }

    /// Map a fraction in `[0, 1]` linearly onto `[min, max]`.
    pub fn resolve_relative(&self, fraction: f64) -> f64 {
        self.min_angle_deg + fraction * (self.max_angle_deg - self.min_angle_deg)
    }

    /// Pause between micro-steps.
    ///
    /// Must only be called on validated parameters.
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(self.step_interval_s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base() -> JointParams {
        JointParams {
            name: "Base".into(),
            channel: 0,
            min_angle_deg: 0.0,
            max_angle_deg: 180.0,
            default_angle_deg: 90.0,
            step_size_deg: 1.0,
            step_interval_s: 0.02,
        }
    }

    #[test]
    fn test_validate() {
        assert!(base().validate().is_ok());

        let mut p = base();
        p.default_angle_deg = 190.0;
        assert!(matches!(p.validate(), Err(JointError::InvalidParams(_))));

        let mut p = base();
        p.min_angle_deg = 100.0;
        assert!(matches!(p.validate(), Err(JointError::InvalidParams(_))));

        let mut p = base();
        p.max_angle_deg = 181.0;
        p.default_angle_deg = 181.0;
        assert!(matches!(p.validate(), Err(JointError::InvalidParams(_))));

        let mut p = base();
        p.step_size_deg = 0.0;
        assert!(matches!(p.validate(), Err(JointError::InvalidParams(_))));

        let mut p = base();
        p.step_interval_s = -0.1;
        assert!(matches!(p.validate(), Err(JointError::InvalidParams(_))));
    }

    #[test]
    fn test_relative_and_clamp() {
        let mut p = base();
        p.min_angle_deg = 35.0;
        p.default_angle_deg = 60.0;

        assert_eq!(p.resolve_relative(0.0), 35.0);
        assert_eq!(p.resolve_relative(1.0), 180.0);
        assert_eq!(p.resolve_relative(0.5), 107.5);

        assert_eq!(p.clamp(20.0), 35.0);
        assert_eq!(p.clamp(200.0), 180.0);
        assert!(p.contains(35.0));
        assert!(!p.contains(34.9));
    }
}
