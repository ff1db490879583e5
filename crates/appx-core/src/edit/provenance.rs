//! Build provenance stamped into `<build:Metadata>`.
//!
//! A packaging run records which tool produced the manifest and which SDK
//! tool versions took part, so a package can be traced back to the
//! toolchain that built it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EditError, ManifestEditor, SetBuildMetadata};
use crate::{GENERATOR_NAME, GENERATOR_VERSION};

/// Build metadata key for MakePri.
pub const MAKE_PRI_KEY: &str = "MakePri.exe";
/// Build metadata key for SignTool.
pub const SIGN_TOOL_KEY: &str = "SignTool.exe";
/// Build metadata key for MakeAppx.
pub const MAKE_APPX_KEY: &str = "MakeAppx.exe";
/// Build metadata key for the operating system version.
pub const OPERATING_SYSTEM_KEY: &str = "OperatingSystem";

/// How incoming tool versions are merged with ones already in the manifest.
///
/// The generator entry is written under every policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverridePolicy {
    /// SignTool and MakeAppx are always written; MakePri and the operating
    /// system only if missing.
    #[default]
    Default,
    /// Everything except the generator only if missing.
    PreferExisting,
    /// Everything is written.
    PreferIncoming,
}

/// Versions of the tools that took part in the build. Unknown versions are
/// recorded as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersions {
    pub make_pri: Option<String>,
    pub sign_tool: Option<String>,
    pub make_appx: Option<String>,
    pub operating_system: Option<String>,
}

/// Writes generator and tool versions into a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceInjector {
    pub generator_name: String,
    pub generator_version: String,
    pub tools: ToolVersions,
}

impl Default for ProvenanceInjector {
    fn default() -> Self {
        Self::new(ToolVersions::default())
    }
}

impl ProvenanceInjector {
    /// An injector identifying this crate as the generator.
    pub fn new(tools: ToolVersions) -> Self {
        Self {
            generator_name: GENERATOR_NAME.to_string(),
            generator_version: GENERATOR_VERSION.to_string(),
            tools,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.generator_name = name.into();
        self.generator_version = version.into();
        self
    }

    /// The two batches written by [`ProvenanceInjector::inject`]: values
    /// that overwrite, and values written only when missing.
    pub fn commands(&self, policy: OverridePolicy) -> (SetBuildMetadata, SetBuildMetadata) {
        let version = |v: &Option<String>| v.clone().unwrap_or_default();
        let generator = (self.generator_name.clone(), self.generator_version.clone());
        let make_pri = (MAKE_PRI_KEY.to_string(), version(&self.tools.make_pri));
        let sign_tool = (SIGN_TOOL_KEY.to_string(), version(&self.tools.sign_tool));
        let make_appx = (MAKE_APPX_KEY.to_string(), version(&self.tools.make_appx));
        let os = (
            OPERATING_SYSTEM_KEY.to_string(),
            version(&self.tools.operating_system),
        );

        let (overwrite, if_missing) = match policy {
            OverridePolicy::Default => (
                vec![generator, sign_tool, make_appx],
                vec![make_pri, os],
            ),
            OverridePolicy::PreferExisting => {
                (vec![generator], vec![make_pri, sign_tool, make_appx, os])
            }
            OverridePolicy::PreferIncoming => (
                vec![generator, make_pri, sign_tool, make_appx, os],
                Vec::new(),
            ),
        };

        (
            SetBuildMetadata::new(overwrite),
            SetBuildMetadata::new(if_missing).only_create_new(),
        )
    }

    /// Stamp the manifest held by `editor`.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::Cancelled`] if the editor's token fires between
    /// the two batches.
    pub fn inject(
        &self,
        editor: &mut ManifestEditor<'_>,
        policy: OverridePolicy,
    ) -> Result<(), EditError> {
        debug!("Injecting build provenance with policy {policy:?}");
        let (overwrite, if_missing) = self.commands(policy);
        editor.apply(&overwrite)?;
        editor.apply(&if_missing)
    }
}
