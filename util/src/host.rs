//! Host platform (linux for example) utility functions

use std::{env, path::PathBuf};

/// Environment variable pointing at the root of the software tree, which holds the `params` and
/// `sessions` directories.
pub const SW_ROOT_ENV_VAR: &str = "EEZYBOT_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the root directory of the software tree from the environment.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
