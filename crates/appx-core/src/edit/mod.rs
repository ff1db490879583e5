//! Manifest edit commands.
//!
//! A command is a plain value describing one edit (add a capability, set
//! identity attributes, upsert build metadata). [`ManifestEditor`] applies
//! commands to a document it borrows exclusively, routing every namespace
//! declaration through a [`NamespaceRegistry`] and every change notification
//! to an [`EditObserver`].
//!
//! # Example
//!
//! ```
//! use appx_core::edit::{AddCapability, ManifestEditor};
//! use appx_core::ManifestDocument;
//!
//! let mut doc: ManifestDocument = r#"<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10"><Identity Name="App"/></Package>"#
//!     .parse()
//!     .unwrap();
//! ManifestEditor::new(&mut doc)
//!     .apply(&AddCapability::new("runFullTrust"))
//!     .unwrap();
//! assert!(doc.to_xml_string().contains(r#"<rescap:Capability Name="runFullTrust"/>"#));
//! ```

mod build_metadata;
mod capability;
mod identity;
pub mod provenance;

use std::sync::Arc;

use appx_schema::validate::ValidationError;
use appx_schema::{CapabilityError, VersionError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::manifest::{ManifestDocument, NamespaceRegistry};
use crate::observer::{EditObserver, NullObserver};

pub use build_metadata::SetBuildMetadata;
pub use capability::AddCapability;
pub use identity::SetIdentity;
pub use provenance::{OverridePolicy, ProvenanceInjector, ToolVersions};

/// Errors produced by edit commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error(transparent)]
    InvalidCapabilityName(#[from] CapabilityError),

    #[error("Invalid value for '{field}': {message}")]
    InvalidArgument {
        /// Manifest attribute or key being set.
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error("Manifest edit was cancelled")]
    Cancelled,
}

impl EditError {
    fn invalid(field: &'static str, err: &ValidationError) -> Self {
        Self::InvalidArgument {
            field,
            message: err.message.clone(),
        }
    }
}

/// One edit of a manifest document.
///
/// A command either applies completely or fails; on failure, parts of a
/// multi-attribute command that were already written stay written.
pub trait ManifestCommand: std::fmt::Debug {
    /// Apply the command.
    ///
    /// # Errors
    ///
    /// Returns an [`EditError`] describing the first value that could not be
    /// applied.
    fn execute(
        &self,
        namespaces: &mut NamespaceRegistry<'_>,
        observer: &dyn EditObserver,
    ) -> Result<(), EditError>;
}

/// Any of the built-in commands, for heterogeneous batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    AddCapability(AddCapability),
    SetIdentity(SetIdentity),
    SetBuildMetadata(SetBuildMetadata),
}

impl ManifestCommand for EditCommand {
    fn execute(
        &self,
        namespaces: &mut NamespaceRegistry<'_>,
        observer: &dyn EditObserver,
    ) -> Result<(), EditError> {
        match self {
            Self::AddCapability(command) => command.execute(namespaces, observer),
            Self::SetIdentity(command) => command.execute(namespaces, observer),
            Self::SetBuildMetadata(command) => command.execute(namespaces, observer),
        }
    }
}

impl From<AddCapability> for EditCommand {
    fn from(command: AddCapability) -> Self {
        Self::AddCapability(command)
    }
}

impl From<SetIdentity> for EditCommand {
    fn from(command: SetIdentity) -> Self {
        Self::SetIdentity(command)
    }
}

impl From<SetBuildMetadata> for EditCommand {
    fn from(command: SetBuildMetadata) -> Self {
        Self::SetBuildMetadata(command)
    }
}

/// Applies commands to a borrowed document.
pub struct ManifestEditor<'d> {
    document: &'d mut ManifestDocument,
    observer: Arc<dyn EditObserver>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for ManifestEditor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestEditor")
            .field("root", &self.document.root().qualified_name())
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<'d> ManifestEditor<'d> {
    pub fn new(document: &'d mut ManifestDocument) -> Self {
        Self {
            document,
            observer: Arc::new(NullObserver),
            cancel: None,
        }
    }

    /// Send change notifications to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn EditObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Stop before the next command once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn document(&self) -> &ManifestDocument {
        self.document
    }

    /// Apply one command.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::Cancelled`] without touching the document if the
    /// token is already cancelled, or the command's own error.
    pub fn apply(&mut self, command: &dyn ManifestCommand) -> Result<(), EditError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(EditError::Cancelled);
        }
        debug!("Applying {command:?}");
        let mut namespaces = NamespaceRegistry::new(self.document);
        command.execute(&mut namespaces, &*self.observer)
    }

    /// Apply commands in order, stopping at the first error. Cancellation is
    /// checked before each command; a command that has started always
    /// finishes.
    ///
    /// # Errors
    ///
    /// See [`ManifestEditor::apply`].
    pub fn apply_all<'c, I, C>(&mut self, commands: I) -> Result<(), EditError>
    where
        I: IntoIterator<Item = &'c C>,
        C: ManifestCommand + 'c,
    {
        for command in commands {
            self.apply(command)?;
        }
        Ok(())
    }
}
