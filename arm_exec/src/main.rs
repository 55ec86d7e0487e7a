//! # Arm Control Executable
//!
//! Interactive control of the Eezybot arm. The arm is started at its default pose and then driven
//! from the keyboard until the shutdown key is pressed or the terminal is closed, at which point
//! every joint is homed and stopped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::sync::Arc;
use structopt::StructOpt;

// Internal
use arm_lib::{
    arm_ctrl::{ArmCtrl, ArmExecParams},
    key_ctrl::{ExitReason, KeyCtrl, ReadlineKeys},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Eezybot $ ";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec", about = "Manual control of the Eezybot arm")]
struct Opts {
    /// Drive in-memory servos instead of the PCA9685 board.
    #[structopt(long)]
    sim: bool,

    /// Parameter file, relative to the params directory.
    #[structopt(long, default_value = "arm_exec.toml")]
    params: String,

    /// Log every completed rotation.
    #[structopt(long)]
    log_rotations: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load(&opts.params)
        .wrap_err_with(|| format!("Failed to load parameters from {}", opts.params))?;

    info!("Parameters loaded");

    // ---- ARM INITIALISATION ----

    let arm = Arc::new(ArmCtrl::open(&params, opts.sim).wrap_err("Failed to initialise the arm")?);
    arm.set_log_rotations(opts.log_rotations);

    arm.start().wrap_err("Failed to start the arm")?;
    arm.to_default().wrap_err("Failed to move the arm to its default pose")?;

    info!("Arm started");

    // ---- KEY CONTROL ----

    let keys = ReadlineKeys::new(PROMPT).wrap_err("Failed to open the terminal")?;
    let key_ctrl = KeyCtrl::new(arm.clone(), &params.arm.key_ctrl);

    info!("Initialisation complete, waiting for keys");

    let reason = key_ctrl
        .spawn(Box::new(keys))
        .wrap_err("Failed to start key control")?
        .join()
        .map_err(|_| color_eyre::eyre::eyre!("Key control thread panicked"))?;

    // ---- SHUTDOWN ----

    if reason != ExitReason::ShutdownRequested {
        info!("Key control ended ({:?}), shutting down", reason);

        if let Err(e) = arm.to_default_and_shutdown(true) {
            warn!("Arm didn't shut down cleanly: {}", e);
        }
        arm.join(None).wrap_err("Failed to wait for the arm to stop")?;
    }

    let angles = arm.angles().wrap_err("Failed to read the final arm angles")?;
    info!("Final angles: {:?}", angles);
    session.save("final_angles.json", angles);

    session.exit();

    Ok(())
}
