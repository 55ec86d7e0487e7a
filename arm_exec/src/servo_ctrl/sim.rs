//! In-memory servo, used to run the arm without any hardware attached and to inspect the exact
//! sequence of angles a joint writes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use super::{check_angle, ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A servo which moves instantly to whatever angle it is given.
pub struct SimServo {
    angle_deg: f64,
    writes: WriteLog,
}

/// Shared record of every angle written to a [`SimServo`].
///
/// Cloning the log gives another view onto the same record, so a test can keep one while the
/// servo itself is moved into a joint controller.
#[derive(Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<f64>>>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServo {
    /// Create a new simulated servo resting at the given angle.
    pub fn new(initial_angle_deg: f64) -> Self {
        Self {
            angle_deg: initial_angle_deg,
            writes: WriteLog::default(),
        }
    }

    /// Get a handle to the log of angles written to this servo.
    pub fn write_log(&self) -> WriteLog {
        self.writes.clone()
    }
}

impl ServoDriver for SimServo {
    fn angle(&self) -> f64 {
        self.angle_deg
    }

    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ServoError> {
        check_angle(angle_deg)?;

        self.angle_deg = angle_deg;
        self.writes
            .0
            .lock()
            .map_err(|_| ServoError::PoisonError)?
            .push(angle_deg);

        Ok(())
    }
}

impl WriteLog {
    /// All angles written so far, oldest first.
    pub fn writes(&self) -> Vec<f64> {
        match self.0.lock() {
            Ok(w) => w.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    /// The most recently written angle.
    pub fn last(&self) -> Option<f64> {
        self.writes().last().copied()
    }

    /// Number of writes so far.
    pub fn len(&self) -> usize {
        self.writes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all previous writes.
    pub fn clear(&self) {
        match self.0.lock() {
            Ok(mut w) => w.clear(),
            Err(p) => p.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sim_servo_records_writes() {
        let mut servo = SimServo::new(90.0);
        let log = servo.write_log();

        assert_eq!(servo.angle(), 90.0);
        assert!(log.is_empty());

        servo.set_angle(91.0).unwrap();
        servo.set_angle(92.5).unwrap();

        assert_eq!(servo.angle(), 92.5);
        assert_eq!(log.writes(), vec![91.0, 92.5]);
        assert_eq!(log.last(), Some(92.5));

        // Out of range writes are rejected and leave the servo where it was
        assert!(servo.set_angle(200.0).is_err());
        assert_eq!(servo.angle(), 92.5);
        assert_eq!(log.len(), 2);

        log.clear();
        assert!(log.is_empty());
    }
}
