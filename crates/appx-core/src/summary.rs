//! Human-oriented summary of a package manifest.

use std::collections::BTreeSet;
use std::path::Path;

use appx_schema::{APPX_MANIFEST_FILE, PackageIdentity, PackageKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::{self, IdentityError};
use crate::manifest::{Element, ManifestDocument};
use crate::vfs::{PackageFileSystem, VfsError};

/// Accent color used when no application declares one.
pub const DEFAULT_ACCENT_COLOR: &str = "Transparent";

/// Kind of application a package contains.
///
/// Variants are ordered by display priority: when a package mixes kinds,
/// the first one present names the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Uwp,
    Win32,
    /// Win32 launched through the Package Support Framework.
    Win32Psf,
    /// Win32 launched through an Advanced Installer stub.
    Win32AiStub,
    Web,
    ProgressiveWebApp,
    Framework,
}

/// How verbose a package type name should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageTypeDisplay {
    Long,
    #[default]
    Normal,
    Short,
}

/// The set of application kinds found in a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageTypes(BTreeSet<PackageType>);

impl PackageTypes {
    pub fn insert(&mut self, package_type: PackageType) {
        self.0.insert(package_type);
    }

    pub fn contains(&self, package_type: PackageType) -> bool {
        self.0.contains(&package_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PackageType> + '_ {
        self.0.iter().copied()
    }

    /// Display name of the highest-priority kind present.
    pub fn display(&self, display: PackageTypeDisplay) -> &'static str {
        use PackageTypeDisplay::{Long, Short};

        let Some(first) = self.0.first() else {
            return match display {
                Short => "App",
                _ => "Unknown",
            };
        };
        match (first, display) {
            (PackageType::Uwp, Long) => "Universal Windows Platform (UWP) app",
            (PackageType::Uwp, _) => "UWP",
            (PackageType::Win32, Long) => "Classic Win32 app",
            (PackageType::Win32, _) => "Win32",
            (PackageType::Win32Psf, Long) => {
                "Classic Win32 app enhanced by Package Support Framework (PSF)"
            }
            (PackageType::Win32Psf, Short) => "PSF",
            (PackageType::Win32Psf, _) => "Win32 + PSF",
            (PackageType::Win32AiStub, Long) => {
                "Classic Win32 app enhanced by Advanced Installer launcher"
            }
            (PackageType::Win32AiStub, Short) => "AI",
            (PackageType::Win32AiStub, _) => "Win32 + AI",
            (PackageType::Web | PackageType::ProgressiveWebApp, Long) => {
                "Progressive Web Application"
            }
            (PackageType::Web | PackageType::ProgressiveWebApp, _) => "PWA",
            (PackageType::Framework, _) => "Framework",
        }
    }
}

impl FromIterator<PackageType> for PackageTypes {
    fn from_iter<I: IntoIterator<Item = PackageType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for PackageTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display(PackageTypeDisplay::Normal))
    }
}

const FULL_TRUST_ENTRY_POINT: &str = "Windows.FullTrustApplication";
const PSF_MARKERS: [&str; 3] = ["\\psflauncher", "\\psfrundll", "\\psfmonitor"];
const AI_STUB_MARKER: &str = "\\ai_stubs";

/// Classify one `<Application>` from its `EntryPoint`, `Executable`,
/// `StartPage` and `HostId` attributes.
pub fn classify_application(
    entry_point: Option<&str>,
    executable: Option<&str>,
    start_page: Option<&str>,
    host_id: Option<&str>,
    is_framework: bool,
) -> Option<PackageType> {
    fn present(value: Option<&str>) -> Option<&str> {
        value.filter(|s| !s.is_empty())
    }
    fn is_exe(path: &str) -> bool {
        path.to_ascii_lowercase().ends_with(".exe")
    }

    if host_id == Some("PWA") {
        return Some(PackageType::ProgressiveWebApp);
    }
    if is_framework {
        return Some(PackageType::Framework);
    }

    if let Some(entry_point) = present(entry_point) {
        if entry_point == FULL_TRUST_ENTRY_POINT {
            let exe = present(executable).filter(|&e| is_exe(e))?;
            let exe = format!("\\{}", exe.replace('/', "\\")).to_ascii_lowercase();
            if PSF_MARKERS.iter().any(|m| exe.contains(m)) {
                return Some(PackageType::Win32Psf);
            }
            if exe.contains(AI_STUB_MARKER) {
                return Some(PackageType::Win32AiStub);
            }
            return Some(PackageType::Win32);
        }
        return present(start_page).is_none().then_some(PackageType::Uwp);
    }

    if executable.is_some_and(is_exe) {
        return Some(PackageType::Win32);
    }
    present(start_page).map(|_| PackageType::Web)
}

/// Identity, properties and application kinds of a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub identity: PackageIdentity,
    pub display_name: Option<String>,
    pub display_publisher: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub is_framework: bool,
    /// First `VisualElements@BackgroundColor`, or [`DEFAULT_ACCENT_COLOR`].
    pub accent_color: String,
    pub package_types: PackageTypes,
}

impl ManifestSummary {
    /// Summarize a package manifest.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidManifest`] if the document is not a
    /// package manifest with an `<Identity>`.
    pub fn from_document(document: &ManifestDocument) -> Result<Self, IdentityError> {
        let identity = identity::from_package_manifest(document)?;
        let root = document.root();
        let namespace = root.namespace();

        let mut summary = Self {
            identity,
            accent_color: DEFAULT_ACCENT_COLOR.to_string(),
            ..Self::default()
        };

        if let Some(properties) = root.child(namespace, "Properties") {
            for property in properties.elements() {
                match property.local_name() {
                    "DisplayName" => summary.display_name = Some(property.text()),
                    "PublisherDisplayName" => summary.display_publisher = Some(property.text()),
                    "Description" => summary.description = Some(property.text()),
                    "Logo" => summary.logo = Some(property.text()),
                    "Framework" => {
                        summary.is_framework = property.text().trim().eq_ignore_ascii_case("true");
                    }
                    _ => {}
                }
            }
        }

        let applications: Vec<&Element> = root
            .child(namespace, "Applications")
            .map(|apps| apps.elements().filter(|e| e.is(namespace, "Application")).collect())
            .unwrap_or_default();

        if let Some(color) = applications
            .iter()
            .flat_map(|app| app.elements())
            .filter(|e| e.local_name() == "VisualElements")
            .find_map(|e| e.attribute("BackgroundColor"))
        {
            summary.accent_color = color.to_string();
        }

        if summary.is_framework {
            summary.package_types.insert(PackageType::Framework);
        }
        for app in applications {
            let host_id = app
                .attributes()
                .find(|a| a.local_name() == "HostId")
                .map(|a| a.value());
            if let Some(package_type) = classify_application(
                app.attribute("EntryPoint"),
                app.attribute("Executable"),
                app.attribute("StartPage"),
                host_id,
                summary.is_framework,
            ) {
                summary.package_types.insert(package_type);
            }
        }

        Ok(summary)
    }

    /// Summarize a loose `AppxManifest.xml`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::FileNotFound`] for a missing file, or any
    /// error of [`ManifestSummary::from_document`].
    pub fn from_manifest_path(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IdentityError::FileNotFound(path.to_path_buf()));
        }
        Self::from_document(&ManifestDocument::load(path)?)
    }

    /// Summarize the manifest inside a package archive.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotAPackage`] if the archive has no
    /// manifest, or any error of [`ManifestSummary::from_document`].
    pub fn from_package(fs: &mut PackageFileSystem<'_>) -> Result<Self, IdentityError> {
        debug!("Reading manifest summary from {}", fs.source());
        let manifest = match fs.get_file(APPX_MANIFEST_FILE) {
            Ok(manifest) => manifest,
            Err(source @ VfsError::FileNotFound(_)) => {
                return Err(IdentityError::NotAPackage {
                    path: fs.source().to_string(),
                    kind: Some(PackageKind::Package),
                    source,
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_document(&ManifestDocument::from_reader(manifest)?)
    }

    /// Display name of the package's application kind.
    pub fn package_type_name(&self, display: PackageTypeDisplay) -> &'static str {
        self.package_types.display(display)
    }
}
