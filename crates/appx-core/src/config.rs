//! SDK tool configuration.
//!
//! Environment:
//! - `APPX_SDK_DIR` - directory holding the packaging tools.
//! - `APPX_SDK_VERBOSE` - `1` or `true` to ask tools for verbose output.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::sdk::SdkError;

/// Environment variable naming the SDK tool directory.
pub const SDK_DIR_ENV: &str = "APPX_SDK_DIR";
/// Environment variable enabling verbose tool output.
pub const SDK_VERBOSE_ENV: &str = "APPX_SDK_VERBOSE";

/// Where to find SDK tools and how to run them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkConfig {
    /// Base directory of the tools. `None` searches `PATH` only.
    pub sdk_dir: Option<PathBuf>,
    /// Pass `/v` to tools that support it.
    pub verbose: bool,
}

impl SdkConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let sdk_dir = std::env::var_os(SDK_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let verbose = std::env::var(SDK_VERBOSE_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self { sdk_dir, verbose }
    }

    #[must_use]
    pub fn with_sdk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sdk_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Find a tool such as `MakeAppx.exe`.
    ///
    /// Looks in the architecture subdirectory of the SDK directory, then the
    /// SDK directory itself, then `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::ToolNotFound`] if none of those has it.
    pub fn locate_tool(&self, name: &str) -> Result<PathBuf, SdkError> {
        if let Some(dir) = &self.sdk_dir {
            for candidate in candidates(dir, name) {
                debug!("Looking for {name} at {}", candidate.display());
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        which::which(name).map_err(|_| SdkError::ToolNotFound(name.to_string()))
    }
}

fn candidates(dir: &Path, name: &str) -> [PathBuf; 2] {
    let arch = if cfg!(target_pointer_width = "64") {
        "x64"
    } else {
        "x86"
    };
    [dir.join(arch).join(name), dir.join(name)]
}
