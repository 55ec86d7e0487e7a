//! # Servo Controller Module
//!
//! This module provides a unified servo interface which abstracts over the hardware used to drive
//! each joint of the arm. A joint controller only ever needs to know the angle its servo is
//! currently at and how to command a new one, so that is all [`ServoDriver`] exposes.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// In-memory [`ServoDriver`] used when no hardware is attached.
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use pca9685::{Pca9685Board, Pca9685Params, Pca9685Servo};
pub use sim::{SimServo, WriteLog};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Lowest angle any hobby servo can be commanded to.
///
/// Units: degrees
pub const SERVO_MIN_ANGLE_DEG: f64 = 0.0;

/// Highest angle any hobby servo can be commanded to.
///
/// Units: degrees
pub const SERVO_MAX_ANGLE_DEG: f64 = 180.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing a single positional servo.
pub trait ServoDriver: Send {
    /// Get the angle the servo is currently at.
    ///
    /// Drivers which can't measure the position report the last commanded angle. The value may be
    /// transiently outside of `[0, 180]` on some hardware, callers should clamp it.
    ///
    /// Units: degrees
    fn angle(&self) -> f64;

    /// Command the servo to the given angle.
    ///
    /// ## Arguments
    /// - `angle_deg` - The angle to move to. Must be between 0 and 180 degrees, values outside
    ///   this range will be rejected.
    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Duty cycle must be between 0.0 and 1.0")]
    InvalidDutyCycle,

    #[error("Angle {0} is outside of the servo's range [0, 180]")]
    InvalidAngle(f64),

    #[error("Channel {0} does not exist on the driver board")]
    InvalidChannel(u8),

    #[error("The driver board lock is poisoned")]
    PoisonError,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Clamp an angle into the range every servo supports.
pub fn clamp_angle(angle_deg: f64) -> f64 {
    angle_deg.max(SERVO_MIN_ANGLE_DEG).min(SERVO_MAX_ANGLE_DEG)
}

/// Check an angle can be written to a servo.
pub(crate) fn check_angle(angle_deg: f64) -> Result<(), ServoError> {
    if !(SERVO_MIN_ANGLE_DEG..=SERVO_MAX_ANGLE_DEG).contains(&angle_deg) {
        return Err(ServoError::InvalidAngle(angle_deg));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp_angle() {
        assert_eq!(clamp_angle(-3.0), 0.0);
        assert_eq!(clamp_angle(181.5), 180.0);
        assert_eq!(clamp_angle(42.0), 42.0);
    }

    #[test]
    fn test_check_angle() {
        assert!(check_angle(0.0).is_ok());
        assert!(check_angle(180.0).is_ok());
        assert!(matches!(check_angle(-0.1), Err(ServoError::InvalidAngle(_))));
        assert!(matches!(check_angle(f64::NAN), Err(ServoError::InvalidAngle(_))));
    }
}
