//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::{fs::read_to_string, path::Path};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (EEZYBOT_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `$EEZYBOT_SW_ROOT/params` directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let mut path = crate::host::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    load_from_path(path)
}

/// Load a parameter file from an explicit path.
pub fn load_from_path<P, Q>(path: Q) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    Q: AsRef<Path>,
{
    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    toml::from_str(params_str.as_str()).map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::{fs, path::PathBuf};

    #[derive(Deserialize)]
    struct TestParams {
        name: String,
        rate_hz: f64,
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("util_params_{}_{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_from_path() {
        let path = temp_file("good.toml", "name = \"base\"\nrate_hz = 50.0\n");
        let params: TestParams = load_from_path(&path).unwrap();
        assert_eq!(params.name, "base");
        assert_eq!(params.rate_hz, 50.0);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_errors() {
        let missing: Result<TestParams, _> = load_from_path("/this/path/does/not/exist.toml");
        assert!(matches!(missing, Err(LoadError::FileLoadError(_))));

        let path = temp_file("bad.toml", "name = 12\n");
        let bad: Result<TestParams, _> = load_from_path(&path);
        assert!(matches!(bad, Err(LoadError::DeserialiseError(_))));
        fs::remove_file(path).ok();
    }
}
