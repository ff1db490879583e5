//! Shared types for APPX/MSIX package manifests.
//!
//! Everything here is pure data: no file, archive, or XML access. The
//! `appx-core` crate builds the side-effecting layers on top of it.

pub mod arch;
pub mod capability;
pub mod identity;
pub mod namespace;
pub mod validate;
pub mod version;

// Re-exports
pub use arch::*;
pub use capability::{CapabilityEntry, CapabilityError, CapabilityKind};
pub use identity::PackageIdentity;
pub use namespace::NamespaceKind;
pub use version::{AppxVersion, VersionError};

/// File name of a package manifest, at the root of a package archive.
pub const APPX_MANIFEST_FILE: &str = "AppxManifest.xml";

/// File name of a bundle manifest.
pub const APPX_BUNDLE_MANIFEST_FILE: &str = "AppxBundleManifest.xml";

/// Archive-relative path of the bundle manifest inside a bundle.
pub const APPX_BUNDLE_MANIFEST_PATH: &str = "AppxMetadata/AppxBundleManifest.xml";

/// Block map generated by the packaging tool; never part of a file mapping.
pub const APPX_BLOCK_MAP_FILE: &str = "AppxBlockMap.xml";

/// Package signature generated by the signing tool; never part of a file mapping.
pub const APPX_SIGNATURE_FILE: &str = "AppxSignature.p7x";

/// Package archive extensions (lowercase, without the dot).
pub const PACKAGE_EXTENSIONS: [&str; 2] = ["appx", "msix"];

/// Bundle archive extensions (lowercase, without the dot).
pub const BUNDLE_EXTENSIONS: [&str; 2] = ["appxbundle", "msixbundle"];

/// Whether a document describes a single package or a bundle of packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// A single package (`AppxManifest.xml`, `<Package>` root).
    Package,
    /// A bundle of packages (`AppxBundleManifest.xml`, `<Bundle>` root).
    Bundle,
}

impl PackageKind {
    /// Archive-relative path of the manifest for this kind.
    pub fn manifest_path(&self) -> &'static str {
        match self {
            Self::Package => APPX_MANIFEST_FILE,
            Self::Bundle => APPX_BUNDLE_MANIFEST_PATH,
        }
    }

    /// Local name of the manifest's root element.
    pub fn root_element(&self) -> &'static str {
        match self {
            Self::Package => "Package",
            Self::Bundle => "Bundle",
        }
    }

    /// Classify a lowercase file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        if PACKAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Package)
        } else if BUNDLE_EXTENSIONS.contains(&ext) {
            Some(Self::Bundle)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Package => write!(f, "package"),
            Self::Bundle => write!(f, "bundle"),
        }
    }
}
