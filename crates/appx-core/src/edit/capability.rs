use appx_schema::capability;
use tracing::{info, warn};

use super::{EditError, ManifestCommand};
use crate::manifest::NamespaceRegistry;
use crate::observer::{CapabilityAdded, EditObserver};

/// Declare a capability in `<Capabilities>`.
///
/// Restricted capabilities go first, everything else last. Adding a
/// capability that is already declared does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCapability {
    pub name: String,
}

impl AddCapability {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ManifestCommand for AddCapability {
    fn execute(
        &self,
        namespaces: &mut NamespaceRegistry<'_>,
        observer: &dyn EditObserver,
    ) -> Result<(), EditError> {
        // Classify before touching the document so a bad name leaves it as is.
        let entry = capability::classify(&self.name)?;

        let root_binding = namespaces.root_binding();
        let binding = namespaces.ensure(entry.namespace, entry.version);
        let element_name = entry.element_name();

        let capabilities = namespaces.root_mut().get_or_insert_with(
            |e| e.local_name() == "Capabilities",
            || root_binding.element("Capabilities"),
        );

        let exists = capabilities.elements().any(|e| {
            binding.matches(e, element_name) && e.attribute("Name") == Some(self.name.as_str())
        });
        if exists {
            warn!(
                "The capability '{}' already exists and will not be added again.",
                self.name
            );
            return Ok(());
        }

        let element = binding
            .element(element_name)
            .with_attribute("Name", self.name.as_str());
        if entry.is_restricted() {
            capabilities.insert_element(0, element);
        } else {
            capabilities.push_element(element);
        }
        info!("Added {element_name} '{}'", self.name);

        observer.capability_added(&CapabilityAdded {
            name: self.name.clone(),
            is_restricted: entry.is_restricted(),
            is_custom: entry.is_custom(),
        });
        Ok(())
    }
}
