//! Fixed XML namespaces used by package and bundle manifests.

/// Windows 10 foundation namespace (default namespace of modern manifests).
pub const FOUNDATION: &str = "http://schemas.microsoft.com/appx/manifest/foundation/windows10";

/// Legacy Windows 8 manifest namespace.
pub const APPX_LEGACY: &str = "http://schemas.microsoft.com/appx/2010/manifest";

/// Universal Windows Platform namespace; versioned variants append `/N`.
pub const UAP: &str = "http://schemas.microsoft.com/appx/manifest/uap/windows10";

/// Restricted capabilities namespace.
pub const RESTRICTED_CAPABILITIES: &str =
    "http://schemas.microsoft.com/appx/manifest/foundation/windows10/restrictedcapabilities";

/// Build provenance metadata namespace.
pub const BUILD: &str = "http://schemas.microsoft.com/developer/appx/2015/build";

/// Windows 10 Mobile namespace.
pub const MOBILE: &str = "http://schemas.microsoft.com/appx/manifest/mobile/windows10";

/// Windows 10 IoT namespace.
pub const IOT: &str = "http://schemas.microsoft.com/appx/manifest/iot/windows10";

/// Bundle manifest namespace.
pub const BUNDLE: &str = "http://schemas.microsoft.com/appx/2013/bundle";

/// Namespaces accepted as the root namespace of a package manifest.
pub const PACKAGE_ROOT_NAMESPACES: [&str; 2] = [FOUNDATION, APPX_LEGACY];

/// A family of manifest namespaces that edit commands may need declared.
///
/// Each family has a base URI and a preferred prefix. Versioned families
/// (UAP in practice) append `/<version>` to the base URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Legacy Windows 8 namespace (`appx`).
    Appx,
    /// Universal Windows Platform (`uap`).
    Uap,
    /// Restricted capabilities (`rescap`).
    RestrictedCapabilities,
    /// Build metadata (`build`).
    Build,
    /// Windows 10 foundation (`win`).
    Foundation,
    /// Windows 10 Mobile (`mobile`).
    Mobile,
    /// Windows 10 IoT (`iot`).
    Iot,
}

impl NamespaceKind {
    /// Base URI of the family, without a version suffix.
    pub fn base_uri(&self) -> &'static str {
        match self {
            Self::Appx => APPX_LEGACY,
            Self::Uap => UAP,
            Self::RestrictedCapabilities => RESTRICTED_CAPABILITIES,
            Self::Build => BUILD,
            Self::Foundation => FOUNDATION,
            Self::Mobile => MOBILE,
            Self::Iot => IOT,
        }
    }

    /// Prefix minted when the namespace is first declared on a document.
    pub fn preferred_prefix(&self) -> &'static str {
        match self {
            Self::Appx => "appx",
            Self::Uap => "uap",
            Self::RestrictedCapabilities => "rescap",
            Self::Build => "build",
            Self::Foundation => "win",
            Self::Mobile => "mobile",
            Self::Iot => "iot",
        }
    }

    /// Full URI for an optional version: `<base>/<version>` or the bare base.
    pub fn uri(&self, version: Option<u8>) -> String {
        match version {
            Some(v) => format!("{}/{v}", self.base_uri()),
            None => self.base_uri().to_string(),
        }
    }
}
