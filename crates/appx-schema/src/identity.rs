//! Package and bundle identity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Architecture;

/// Identity of a package or bundle, as declared by its `<Identity>` element.
///
/// Every field is optional because manifests in the wild omit attributes;
/// validating presence is the caller's decision. For bundles,
/// `architectures` is the union of the `Architecture` attributes of all
/// contained `<Package>` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// `Identity@Name`.
    pub name: Option<String>,
    /// `Identity@Publisher`, an X.500 distinguished name.
    pub publisher: Option<String>,
    /// `Identity@Version`, kept verbatim.
    pub version: Option<String>,
    /// Declared architectures, deduplicated.
    #[serde(default)]
    pub architectures: BTreeSet<Architecture>,
}

impl PackageIdentity {
    /// Whether the identity declares the given architecture.
    pub fn targets(&self, arch: Architecture) -> bool {
        self.architectures.contains(&arch)
    }
}

impl std::fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.version.as_deref().unwrap_or("<no version>"),
            self.publisher.as_deref().unwrap_or("<no publisher>"),
        )?;
        if !self.architectures.is_empty() {
            let archs: Vec<&str> = self.architectures.iter().map(Architecture::as_str).collect();
            write!(f, " [{}]", archs.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_architectures() {
        let identity = PackageIdentity {
            name: Some("App".to_string()),
            publisher: Some("CN=X".to_string()),
            version: Some("1.0.0.0".to_string()),
            architectures: [Architecture::X64, Architecture::X86].into_iter().collect(),
        };
        assert_eq!(identity.to_string(), "App 1.0.0.0 (CN=X) [x86, x64]");
        assert!(identity.targets(Architecture::X64));
        assert!(!identity.targets(Architecture::Arm64));
    }

    #[test]
    fn test_serialize_lowercase_architectures() {
        let identity = PackageIdentity {
            name: Some("App".to_string()),
            architectures: [Architecture::Arm64].into_iter().collect(),
            ..Default::default()
        };
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"arm64\""));
    }
}
