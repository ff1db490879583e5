//! Package identity detection.
//!
//! Accepts a loose manifest, a package or a bundle, either as a named file
//! or as an anonymous stream. Named files are classified by extension.
//! Streams are probed in a fixed order: XML first, then ZIP. A probe either
//! matches, gives up (the next probe runs), or fails outright once it has
//! recognized the shape of the input.

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use appx_schema::namespace::{BUNDLE, PACKAGE_ROOT_NAMESPACES};
use appx_schema::{
    APPX_BUNDLE_MANIFEST_FILE, APPX_MANIFEST_FILE, Architecture, PackageIdentity, PackageKind,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manifest::{Element, ManifestDocument, XmlError};
use crate::vfs::{PackageFileSystem, VfsError};

const STREAM_LABEL: &str = "<stream>";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("{path} is not a valid {}, because it does not contain a manifest", kind_name(.kind.as_ref()))]
    NotAPackage {
        path: String,
        /// Expected kind; `None` when probing a stream of unknown kind.
        kind: Option<PackageKind>,
        #[source]
        source: VfsError,
    },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Vfs(VfsError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Identity resolution was cancelled")]
    Cancelled,
}

fn kind_name(kind: Option<&PackageKind>) -> &'static str {
    match kind {
        Some(PackageKind::Package) => "APPX/MSIX package",
        Some(PackageKind::Bundle) => "APPX/MSIX bundle",
        None => "APPX/MSIX package or bundle",
    }
}

impl From<VfsError> for IdentityError {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::Cancelled => Self::Cancelled,
            other => Self::Vfs(other),
        }
    }
}

/// Outcome of one detection probe.
enum Probe {
    Match(PackageIdentity),
    /// The input does not have this probe's shape; try the next one.
    Inconclusive,
}

/// Resolves the identity of manifests, packages and bundles.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    cancel: Option<CancellationToken>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort archive reads once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancelled(&self) -> Result<(), IdentityError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(IdentityError::Cancelled);
        }
        Ok(())
    }

    fn file_system<'a>(&self, fs: PackageFileSystem<'a>) -> PackageFileSystem<'a> {
        match &self.cancel {
            Some(token) => fs.with_cancellation(token.clone()),
            None => fs,
        }
    }

    /// Resolve the identity of a file, judged by its extension.
    ///
    /// `AppxManifest.xml` and `AppxBundleManifest.xml` are read as loose
    /// manifests; `.appx`/`.msix` and `.appxbundle`/`.msixbundle` as
    /// archives.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::FileNotFound`] for a missing file,
    /// [`IdentityError::UnsupportedInput`] for any other name or extension,
    /// and [`IdentityError::NotAPackage`] for an archive without a manifest.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PackageIdentity, IdentityError> {
        let path = path.as_ref();
        self.check_cancelled()?;
        if !path.exists() {
            return Err(IdentityError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if extension == "xml" {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let kind = if file_name.eq_ignore_ascii_case(APPX_MANIFEST_FILE) {
                PackageKind::Package
            } else if file_name.eq_ignore_ascii_case(APPX_BUNDLE_MANIFEST_FILE) {
                PackageKind::Bundle
            } else {
                return Err(IdentityError::UnsupportedInput(format!(
                    "{} is neither {APPX_MANIFEST_FILE} nor {APPX_BUNDLE_MANIFEST_FILE}",
                    path.display()
                )));
            };
            debug!("Reading {kind} manifest {}", path.display());
            let document = ManifestDocument::load(path)?;
            return extract(&document, kind);
        }

        let Some(kind) = PackageKind::from_extension(&extension) else {
            return Err(IdentityError::UnsupportedInput(format!(
                "{} has an unsupported file extension",
                path.display()
            )));
        };

        debug!("Opening {kind} archive {}", path.display());
        let mut fs = self.file_system(PackageFileSystem::from_path(path));
        let manifest = match fs.get_file(kind.manifest_path()) {
            Ok(manifest) => manifest,
            Err(source @ VfsError::FileNotFound(_)) => {
                return Err(IdentityError::NotAPackage {
                    path: path.display().to_string(),
                    kind: Some(kind),
                    source,
                });
            }
            Err(e) => return Err(e.into()),
        };
        fs.close();

        let document = ManifestDocument::from_reader(manifest)?;
        extract(&document, kind)
    }

    /// Resolve the identity of an anonymous stream by sniffing its content.
    ///
    /// The stream is read to the end first, so it need not be seekable.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::UnsupportedInput`] if the content is XML with
    /// an unexpected root element or is neither XML nor a ZIP archive, and
    /// [`IdentityError::NotAPackage`] for an archive without a manifest.
    pub fn resolve_reader(&self, mut reader: impl Read) -> Result<PackageIdentity, IdentityError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.resolve_bytes(&bytes)
    }

    /// [`IdentityResolver::resolve_reader`] over an in-memory buffer.
    ///
    /// # Errors
    ///
    /// See [`IdentityResolver::resolve_reader`].
    pub fn resolve_bytes(&self, bytes: &[u8]) -> Result<PackageIdentity, IdentityError> {
        self.check_cancelled()?;

        if let Probe::Match(identity) = probe_xml(bytes)? {
            return Ok(identity);
        }
        self.check_cancelled()?;
        if let Probe::Match(identity) = self.probe_zip(bytes)? {
            return Ok(identity);
        }

        Err(IdentityError::UnsupportedInput(
            "the stream is neither a manifest nor a package archive".to_string(),
        ))
    }

    /// Resolve a file on a blocking worker thread.
    ///
    /// # Errors
    ///
    /// See [`IdentityResolver::resolve_path`]. A worker that panics or is
    /// aborted is reported as [`IdentityError::Io`].
    pub async fn resolve_path_async(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<PackageIdentity, IdentityError> {
        let path = path.into();
        let resolver = self.clone();
        tokio::task::spawn_blocking(move || resolver.resolve_path(path))
            .await
            .map_err(io::Error::other)?
    }

    fn probe_zip(&self, bytes: &[u8]) -> Result<Probe, IdentityError> {
        let fs = match PackageFileSystem::from_reader(Cursor::new(bytes)) {
            Ok(fs) => fs,
            Err(e) => {
                debug!("Not a ZIP archive: {e}");
                return Ok(Probe::Inconclusive);
            }
        };
        let mut fs = self.file_system(fs);

        for kind in [PackageKind::Package, PackageKind::Bundle] {
            let path = kind.manifest_path();
            if !fs.file_exists(path)? {
                debug!("No {path} in archive");
                continue;
            }
            let document = ManifestDocument::from_reader(fs.get_file(path)?)?;
            return extract(&document, kind).map(Probe::Match);
        }

        Err(IdentityError::NotAPackage {
            path: STREAM_LABEL.to_string(),
            kind: None,
            source: VfsError::FileNotFound(APPX_MANIFEST_FILE.to_string()),
        })
    }
}

fn probe_xml(bytes: &[u8]) -> Result<Probe, IdentityError> {
    let document = match ManifestDocument::parse(bytes) {
        Ok(document) => document,
        Err(e) => {
            debug!("Not an XML manifest: {e}");
            return Ok(Probe::Inconclusive);
        }
    };
    match document.kind() {
        Some(kind) => extract(&document, kind).map(Probe::Match),
        None => Err(IdentityError::UnsupportedInput(format!(
            "XML root element <{}> is neither <Package> nor <Bundle>",
            document.root().qualified_name()
        ))),
    }
}

fn extract(document: &ManifestDocument, kind: PackageKind) -> Result<PackageIdentity, IdentityError> {
    let identity = match kind {
        PackageKind::Package => from_package_manifest(document)?,
        PackageKind::Bundle => from_bundle_manifest(document)?,
    };
    info!("Recognized {kind} {identity}");
    Ok(identity)
}

fn check_root(root: &Element, local_name: &str, namespaces: &[&str]) -> Result<(), IdentityError> {
    let namespace_ok = root.namespace().is_none_or(|ns| namespaces.contains(&ns));
    if root.local_name() != local_name || !namespace_ok {
        return Err(IdentityError::InvalidManifest(format!(
            "expected a <{local_name}> root element, found <{}> in namespace '{}'",
            root.local_name(),
            root.namespace().unwrap_or_default()
        )));
    }
    Ok(())
}

fn read_identity(root: &Element) -> Result<(&Element, PackageIdentity), IdentityError> {
    let element = root
        .child(root.namespace(), "Identity")
        .ok_or_else(|| IdentityError::InvalidManifest("missing <Identity> element".to_string()))?;
    let attr = |name: &str| element.attribute(name).map(str::to_string);
    let identity = PackageIdentity {
        name: attr("Name"),
        publisher: attr("Publisher"),
        version: attr("Version"),
        ..PackageIdentity::default()
    };
    Ok((element, identity))
}

fn parse_architecture(value: &str) -> Option<Architecture> {
    match value.parse() {
        Ok(arch) => Some(arch),
        Err(e) => {
            warn!("Ignoring architecture '{value}': {e}");
            None
        }
    }
}

/// Identity of a package manifest (`<Package>` root).
///
/// An unrecognized `ProcessorArchitecture` is dropped with a warning.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidManifest`] if the root or `<Identity>`
/// is wrong or missing.
pub fn from_package_manifest(document: &ManifestDocument) -> Result<PackageIdentity, IdentityError> {
    let root = document.root();
    check_root(root, "Package", &PACKAGE_ROOT_NAMESPACES)?;
    let (element, mut identity) = read_identity(root)?;
    if let Some(arch) = element
        .attribute("ProcessorArchitecture")
        .and_then(parse_architecture)
    {
        identity.architectures.insert(arch);
    }
    Ok(identity)
}

/// Identity of a bundle manifest (`<Bundle>` root), with the union of the
/// architectures of its packages.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidManifest`] if the root or `<Identity>`
/// is wrong or missing.
pub fn from_bundle_manifest(document: &ManifestDocument) -> Result<PackageIdentity, IdentityError> {
    let root = document.root();
    check_root(root, "Bundle", &[BUNDLE])?;
    let (_, mut identity) = read_identity(root)?;
    if let Some(packages) = root.child(root.namespace(), "Packages") {
        identity.architectures.extend(
            packages
                .elements()
                .filter(|e| e.local_name() == "Package")
                .filter_map(|e| e.attribute("Architecture"))
                .filter_map(parse_architecture),
        );
    }
    Ok(identity)
}

/// Resolve a file with a default [`IdentityResolver`].
///
/// # Errors
///
/// See [`IdentityResolver::resolve_path`].
pub fn resolve_path(path: impl AsRef<Path>) -> Result<PackageIdentity, IdentityError> {
    IdentityResolver::new().resolve_path(path)
}

/// Resolve a stream with a default [`IdentityResolver`].
///
/// # Errors
///
/// See [`IdentityResolver::resolve_reader`].
pub fn resolve_reader(reader: impl Read) -> Result<PackageIdentity, IdentityError> {
    IdentityResolver::new().resolve_reader(reader)
}

/// Resolve a file without blocking the async runtime.
///
/// # Errors
///
/// See [`IdentityResolver::resolve_path_async`].
pub async fn resolve_path_async(path: impl Into<PathBuf>) -> Result<PackageIdentity, IdentityError> {
    IdentityResolver::new().resolve_path_async(path).await
}
