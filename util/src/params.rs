//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot determine the software root directory")]
    SwRootNotFound,

    #[error("Cannot load the parmeter file {0:?}: {1}")]
    FileLoadError(PathBuf, std::io::Error),

    #[error("Cannot read the parameter file {0:?}: {1}")]
    DeserialiseError(PathBuf, toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the full path to a file in the params directory.
pub fn param_path(param_file_path: &str) -> Result<PathBuf, LoadError> {
    let mut path = crate::host::get_sw_root()
        .map_err(|_| LoadError::SwRootNotFound)?;
    path.push("params");
    path.push(param_file_path);

    Ok(path)
}

/// Load a parameter file
///
/// The file path is relative to the "params" directory under the software root.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError> 
where
    P: DeserializeOwned
{
    load_from(param_path(param_file_path)?)
}

/// Load a parameter file from an explicit path.
pub fn load_from<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>
{
    let path = path.as_ref();

    let params_str = read_to_string(path)
        .map_err(|e| LoadError::FileLoadError(path.to_path_buf(), e))?;

    toml::from_str(params_str.as_str())
        .map_err(|e| LoadError::DeserialiseError(path.to_path_buf(), e))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct TestParams {
        gain: f64,
        name: String
    }

    #[test]
    fn test_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.toml");
        std::fs::write(&path, "gain = 0.5\nname = \"steer\"\n").unwrap();

        let p: TestParams = load_from(&path).unwrap();
        assert_eq!(p.gain, 0.5);
        assert_eq!(p.name, "steer");

        std::fs::write(&path, "gain = \"oops\"\n").unwrap();
        match load_from::<TestParams, _>(&path) {
            Err(LoadError::DeserialiseError(..)) => (),
            r => panic!("Expected a deserialise error, got {:?}", r)
        }

        match load_from::<TestParams, _>(dir.path().join("missing.toml")) {
            Err(LoadError::FileLoadError(..)) => (),
            r => panic!("Expected a file load error, got {:?}", r)
        }
    }
}
