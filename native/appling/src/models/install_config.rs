use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::InstallError;

/// What the worker needs to install one application.
///
/// Assembled by the main side after preflight and sent to the worker once,
/// in answer to its `ready` message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Installation directory, the one the installation lock guards.
    #[serde(default)]
    pub dir: PathBuf,
    /// Key of the platform runtime to bootstrap when it is missing.
    #[serde(default)]
    pub platform: String,
    /// Link of the application to install, e.g. `pear://<id>`.
    #[serde(default)]
    pub link: String,
}

impl InstallConfig {
    /// Checks that every field is set, reporting the first missing one.
    pub fn validate(&self) -> Result<(), InstallError> {
        if self.dir.as_os_str().is_empty() {
            return Err(InstallError::MissingField("dir"));
        }
        if self.platform.is_empty() {
            return Err(InstallError::MissingField("platform"));
        }
        if self.link.is_empty() {
            return Err(InstallError::MissingField("link"));
        }
        Ok(())
    }
}
