//! [`ServoDriver`] implementation for the PCA9685 driver
//!
//! All servos of the arm share one board, so the board lives behind an `Arc<Mutex<_>>` and each
//! joint gets a [`Pca9685Servo`] handle addressing its own channel.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::debug;
use pwm_pca9685::{Address, Channel, Pca9685};
use serde::{Deserialize, Serialize};

use super::{check_angle, ServoDriver, ServoError, SERVO_MAX_ANGLE_DEG};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: u16 = 4096;

/// Frequency of the board's internal oscillator.
///
/// Units: hertz
const OSC_CLOCK_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the PCA9685 board and the servos attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca9685Params {
    /// I2C address of the board
    pub address: u8,

    /// PWM frequency
    ///
    /// Units: hertz
    pub pwm_freq_hz: f64,

    /// Pulse length commanding the servo to 0 degrees
    ///
    /// Units: microseconds
    pub min_pulse_us: f64,

    /// Pulse length commanding the servo to 180 degrees
    ///
    /// Units: microseconds
    pub max_pulse_us: f64,
}

/// A PCA9685 board shared between the servos plugged into it.
pub struct Pca9685Board<I2C> {
    driver: Arc<Mutex<Pca9685<I2C>>>,
    params: Pca9685Params,
}

/// A single servo channel on a [`Pca9685Board`].
pub struct Pca9685Servo<I2C> {
    board: Pca9685Board<I2C>,
    channel: Channel,

    /// The board can't measure the servo position, so the last commanded angle is kept here.
    last_angle_deg: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Pca9685Params {
    fn default() -> Self {
        Self {
            address: 0x40,
            pwm_freq_hz: 50.0,
            min_pulse_us: 750.0,
            max_pulse_us: 2250.0,
        }
    }
}

impl<I2C> Clone for Pca9685Board<I2C> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            params: self.params.clone(),
        }
    }
}

impl<I2C, E> Pca9685Board<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Initialise the board on the given bus, setting the PWM frequency and enabling outputs.
    pub fn new(i2c: I2C, params: Pca9685Params) -> Result<Self, ServoError> {
        let mut driver = Pca9685::new(i2c, Address::from(params.address)).map_err(map_err)?;

        let prescale = (OSC_CLOCK_HZ / (MAX_PWM as f64 * params.pwm_freq_hz)).round() - 1.0;
        driver
            .set_prescale(prescale.max(3.0).min(255.0) as u8)
            .map_err(map_err)?;
        driver.enable().map_err(map_err)?;

        debug!(
            "PCA9685 at {:#04x} initialised with prescale {}",
            params.address, prescale
        );

        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            params,
        })
    }

    /// Create a servo handle for one channel of the board.
    ///
    /// ## Arguments
    /// - `channel` - The channel number (0 to 15) the servo is plugged into
    /// - `initial_angle_deg` - The angle the servo is assumed to start at
    pub fn servo(
        &self,
        channel: u8,
        initial_angle_deg: f64,
    ) -> Result<Pca9685Servo<I2C>, ServoError> {
        Ok(Pca9685Servo {
            board: self.clone(),
            channel: channel_from_u8(channel)?,
            last_angle_deg: initial_angle_deg,
        })
    }

    /// Set the duty cycle of a channel.
    ///
    /// ## Arguments
    /// - `channel` - The channel to set the duty cycle for
    /// - `duty_cycle` - The duty cycle to set. Must be a value between 0.0 and 1.0. Values outside
    ///   this range will be rejected.
    pub fn set_duty_cycle(&self, channel: Channel, duty_cycle: f64) -> Result<(), ServoError> {
        // If the duty cycle is out of range return an error
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(ServoError::InvalidDutyCycle);
        }

        let off = ((duty_cycle * (MAX_PWM as f64)) as u16).min(MAX_PWM - 1);

        self.driver
            .lock()
            .map_err(|_| ServoError::PoisonError)?
            .set_channel_on_off(channel, 0, off)
            .map_err(map_err)
    }

    /// Duty cycle producing the pulse length for the given angle.
    fn angle_to_duty_cycle(&self, angle_deg: f64) -> f64 {
        let pulse_us = self.params.min_pulse_us
            + (self.params.max_pulse_us - self.params.min_pulse_us) * angle_deg
                / SERVO_MAX_ANGLE_DEG;
        let period_us = 1e6 / self.params.pwm_freq_hz;

        pulse_us / period_us
    }
}

impl<I2C, E> ServoDriver for Pca9685Servo<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E> + Send,
{
    fn angle(&self) -> f64 {
        self.last_angle_deg
    }

    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ServoError> {
        check_angle(angle_deg)?;

        let duty_cycle = self.board.angle_to_duty_cycle(angle_deg);
        self.board.set_duty_cycle(self.channel, duty_cycle)?;
        self.last_angle_deg = angle_deg;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn map_err<E>(e: pwm_pca9685::Error<E>) -> ServoError {
    match e {
        pwm_pca9685::Error::I2C(_) => ServoError::I2c,
        pwm_pca9685::Error::InvalidInputData => ServoError::InvalidDutyCycle,
    }
}

fn channel_from_u8(channel: u8) -> Result<Channel, ServoError> {
    Ok(match channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        c => return Err(ServoError::InvalidChannel(c)),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_from_u8() {
        assert!(matches!(channel_from_u8(0), Ok(Channel::C0)));
        assert!(matches!(channel_from_u8(15), Ok(Channel::C15)));
        assert!(matches!(
            channel_from_u8(16),
            Err(ServoError::InvalidChannel(16))
        ));
    }
}
