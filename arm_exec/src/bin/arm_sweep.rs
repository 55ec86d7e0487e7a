//! # Arm Sweep
//!
//! Moves every joint through its full range (default, max, min, default) to check the servo
//! wiring and bounds, then shuts the arm down.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use arm_lib::arm_ctrl::{ArmCtrl, ArmExecParams, JointId};
use color_eyre::{eyre::WrapErr, Result};
use log::info;
use structopt::StructOpt;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "arm_sweep", about = "Sweep every joint of the Eezybot arm through its range")]
struct Opts {
    /// Drive in-memory servos instead of the PCA9685 board.
    #[structopt(long)]
    sim: bool,

    /// Parameter file, relative to the params directory.
    #[structopt(long, default_value = "arm_exec.toml")]
    params: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    let session = Session::new("arm_sweep", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    let params: ArmExecParams =
        util::params::load(&opts.params).wrap_err("Failed to load parameters")?;

    let arm = ArmCtrl::open(&params, opts.sim).wrap_err("Failed to initialise the arm")?;
    arm.set_log_rotations(true);
    arm.start()?;

    for id in JointId::ALL.iter() {
        let joint = arm.joint(*id);
        let p = joint.params();

        info!(
            "Sweeping {} through [{}, {}]",
            joint.name(),
            p.min_angle_deg,
            p.max_angle_deg
        );

        joint
            .to_default()?
            .rotate(p.max_angle_deg)?
            .rotate(p.min_angle_deg)?
            .to_default()?
            .wait()?;
    }

    info!("Sweep complete, final angles: {:?}", arm.angles()?);

    arm.to_default_and_shutdown(false)?;
    arm.join(None)?;

    session.exit();

    Ok(())
}
