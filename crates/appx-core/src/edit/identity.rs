use appx_schema::{Architecture, validate, version};
use tracing::info;

use super::{EditError, ManifestCommand};
use crate::manifest::{Element, NamespaceRegistry};
use crate::observer::{EditObserver, ValueChange};

/// Set attributes of `<Identity>`. Fields left as `None` are not touched.
///
/// The version may be a mask such as `*.*.*.+`, resolved against the
/// version already in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetIdentity {
    pub name: Option<String>,
    pub publisher: Option<String>,
    pub version: Option<String>,
    pub processor_architecture: Option<Architecture>,
    pub resource_id: Option<String>,
}

impl SetIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    /// Version or version mask.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_processor_architecture(mut self, arch: Architecture) -> Self {
        self.processor_architecture = Some(arch);
        self
    }

    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

fn set(identity: &mut Element, observer: &dyn EditObserver, key: &'static str, value: &str) {
    let previous = identity.set_attribute(key, value);
    match &previous {
        Some(old) => info!("Changing attribute '{key}' from '{old}' to '{value}'"),
        None => info!("Setting attribute '{key}' to '{value}'"),
    }
    observer.value_changed(&ValueChange::from_previous(key, previous, value));
}

impl ManifestCommand for SetIdentity {
    fn execute(
        &self,
        namespaces: &mut NamespaceRegistry<'_>,
        observer: &dyn EditObserver,
    ) -> Result<(), EditError> {
        let root_binding = namespaces.root_binding();
        let identity = namespaces.root_mut().get_or_insert_with(
            |e| e.local_name() == "Identity",
            || root_binding.element("Identity"),
        );

        if let Some(publisher) = &self.publisher {
            validate::validate_publisher(publisher)
                .map_err(|e| EditError::invalid("Publisher", &e))?;
            set(identity, observer, "Publisher", publisher);
        }

        if let Some(name) = &self.name {
            validate::validate_package_name(name).map_err(|e| EditError::invalid("Name", &e))?;
            set(identity, observer, "Name", name);
        }

        if let Some(mask) = &self.version {
            let resolved = version::resolve_mask_str(mask, identity.attribute("Version"))?;
            validate::validate_version(&resolved)
                .map_err(|e| EditError::invalid("Version", &e))?;
            set(identity, observer, "Version", &resolved);
        }

        if let Some(arch) = self.processor_architecture {
            set(identity, observer, "ProcessorArchitecture", arch.as_str());
        }

        if let Some(resource_id) = &self.resource_id {
            validate::validate_resource_id(resource_id)
                .map_err(|e| EditError::invalid("ResourceId", &e))?;
            set(identity, observer, "ResourceId", resource_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManifestDocument;
    use crate::edit::ManifestEditor;
    use crate::observer::RecordingObserver;
    use std::sync::Arc;

    const FOUNDATION: &str = appx_schema::namespace::FOUNDATION;

    fn manifest(identity: &str) -> ManifestDocument {
        format!(r#"<Package xmlns="{FOUNDATION}">{identity}<Properties/></Package>"#)
            .parse()
            .unwrap()
    }

    fn run(doc: &mut ManifestDocument, command: &SetIdentity) -> (Result<(), EditError>, Vec<ValueChange>) {
        let recorder = Arc::new(RecordingObserver::new());
        let result = ManifestEditor::new(doc)
            .with_observer(recorder.clone())
            .apply(command);
        (result, recorder.value_changes())
    }

    #[test]
    fn test_version_mask_and_events() {
        let mut doc = manifest(r#"<Identity Name="App" Version="1.2.3.4"/>"#);
        let command = SetIdentity::new()
            .with_version("*.*.+.0")
            .with_processor_architecture(Architecture::X64);
        let (result, changes) = run(&mut doc, &command);
        result.unwrap();

        let identity = doc.root().child(Some(FOUNDATION), "Identity").unwrap();
        assert_eq!(identity.attribute("Version"), Some("1.2.4.0"));
        assert_eq!(identity.attribute("ProcessorArchitecture"), Some("x64"));
        assert_eq!(
            changes,
            [
                ValueChange::Changed {
                    key: "Version".into(),
                    old: "1.2.3.4".into(),
                    new: "1.2.4.0".into(),
                },
                ValueChange::Created {
                    key: "ProcessorArchitecture".into(),
                    value: "x64".into(),
                },
            ]
        );
    }

    #[test]
    fn test_creates_identity_in_root_namespace() {
        let mut doc = manifest("");
        let command = SetIdentity::new()
            .with_publisher("CN=Contoso")
            .with_name("Contoso.App")
            .with_version("1.0.0.0");
        let (result, changes) = run(&mut doc, &command);
        result.unwrap();

        let identity = doc.root().child(Some(FOUNDATION), "Identity").unwrap();
        assert_eq!(identity.attribute("Name"), Some("Contoso.App"));
        let keys: Vec<_> = changes.iter().map(ValueChange::key).collect();
        assert_eq!(keys, ["Publisher", "Name", "Version"]);
        // Appended after the existing Properties element.
        assert_eq!(doc.root().elements().last().unwrap().local_name(), "Identity");
    }

    #[test]
    fn test_unchanged_value_still_reported() {
        let mut doc = manifest(r#"<Identity Name="App"/>"#);
        let (result, changes) = run(&mut doc, &SetIdentity::new().with_name("App"));
        result.unwrap();
        assert_eq!(
            changes,
            [ValueChange::Changed {
                key: "Name".into(),
                old: "App".into(),
                new: "App".into(),
            }]
        );
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut doc = manifest(r#"<Identity Name="App"/>"#);
        let (result, changes) = run(&mut doc, &SetIdentity::new().with_name("a b"));
        assert!(matches!(result, Err(EditError::InvalidArgument { field: "Name", .. })));
        assert!(changes.is_empty());
        assert_eq!(
            doc.root().child_by_local_name("Identity").unwrap().attribute("Name"),
            Some("App")
        );
    }

    #[test]
    fn test_mask_without_existing_version() {
        let mut doc = manifest(r#"<Identity Name="App"/>"#);
        let (result, _) = run(&mut doc, &SetIdentity::new().with_version("*.*.*.+"));
        result.unwrap();
        assert_eq!(
            doc.root().child_by_local_name("Identity").unwrap().attribute("Version"),
            Some("1.0.0.1")
        );
    }

    #[test]
    fn test_malformed_mask() {
        let mut doc = manifest(r#"<Identity Name="App" Version="1.0.0.0"/>"#);
        let (result, changes) = run(&mut doc, &SetIdentity::new().with_version("1.*.2.3.4"));
        assert!(matches!(result, Err(EditError::InvalidVersion(_))));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_earlier_fields_stay_written_on_failure() {
        let mut doc = manifest(r#"<Identity Name="App"/>"#);
        let command = SetIdentity::new()
            .with_publisher("CN=Contoso")
            .with_resource_id(".bad");
        let (result, changes) = run(&mut doc, &command);
        assert!(matches!(
            result,
            Err(EditError::InvalidArgument { field: "ResourceId", .. })
        ));
        assert_eq!(changes.len(), 1);
        assert_eq!(
            doc.root().child_by_local_name("Identity").unwrap().attribute("Publisher"),
            Some("CN=Contoso")
        );
    }
}
