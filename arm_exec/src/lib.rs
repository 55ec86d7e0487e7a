//! # Arm Library
//!
//! Control of the Eezybot 4-servo arm: a rotating base, a vertical and a horizontal arm joint and
//! a gripper clutch.
//!
//! Each joint is driven by its own [`joint_ctrl::JointCtrl`], which moves the servo in small,
//! paced steps on a background thread. [`arm_ctrl::ArmCtrl`] owns the four joints and coordinates
//! them, and [`key_ctrl::KeyCtrl`] lets an operator drive the arm from the keyboard.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm coordinator, owning all four joints.
pub mod arm_ctrl;

/// Asynchronous single joint controller.
pub mod joint_ctrl;

/// Manual keyboard control.
pub mod key_ctrl;

/// Target observations.
pub mod obs;

/// Drivers used to control servos.
pub mod servo_ctrl;
