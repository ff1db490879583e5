pub mod config;
pub mod edit;
pub mod identity;
pub mod manifest;
pub mod observer;
pub mod pattern;
pub mod sdk;
pub mod summary;
pub mod vfs;

pub use config::SdkConfig;
pub use edit::{EditCommand, EditError, ManifestCommand, ManifestEditor};
pub use identity::{IdentityError, IdentityResolver};
pub use manifest::{Element, ManifestDocument, NamespaceBinding, NamespaceRegistry, XmlError};
pub use observer::{EditObserver, NullObserver, RecordingObserver};
pub use sdk::{MakeAppx, PackOptions, PackageFileList, SdkError};
pub use summary::ManifestSummary;
pub use vfs::{AppxFileInfo, PackageFileSystem, VfsError};

/// Generator name written into build provenance metadata.
pub const GENERATOR_NAME: &str = env!("CARGO_PKG_NAME");

/// Generator version written into build provenance metadata.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
