use appx_schema::NamespaceKind;
use tracing::{debug, info};

use super::{EditError, ManifestCommand};
use crate::manifest::NamespaceRegistry;
use crate::observer::{EditObserver, ValueChange};

/// Upsert `<build:Item Name=".." Version=".."/>` entries under
/// `<build:Metadata>`.
///
/// Items are matched by name, ignoring ASCII case. With `only_create_new`
/// set, items that already carry a version are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetBuildMetadata {
    /// Name and version pairs, applied in order.
    pub values: Vec<(String, String)>,
    pub only_create_new: bool,
}

impl SetBuildMetadata {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            only_create_new: false,
        }
    }

    /// Only write items that are missing or have no version yet.
    #[must_use]
    pub fn only_create_new(mut self) -> Self {
        self.only_create_new = true;
        self
    }
}

impl ManifestCommand for SetBuildMetadata {
    fn execute(
        &self,
        namespaces: &mut NamespaceRegistry<'_>,
        observer: &dyn EditObserver,
    ) -> Result<(), EditError> {
        if self.values.is_empty() {
            return Ok(());
        }

        let build = namespaces.ensure(NamespaceKind::Build, None);
        let metadata = namespaces.root_mut().get_or_insert_with(
            |e| build.matches(e, "Metadata"),
            || build.element("Metadata"),
        );

        for (name, version) in &self.values {
            let existing = metadata.elements_mut().find(|e| {
                build.matches(e, "Item")
                    && e.attribute("Name")
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
            });

            let change = match existing {
                None => {
                    metadata.push_element(
                        build
                            .element("Item")
                            .with_attribute("Name", name.as_str())
                            .with_attribute("Version", version.as_str()),
                    );
                    info!("Setting build metadata '{name}' to '{version}'");
                    ValueChange::from_previous(name, None, version)
                }
                Some(item) => {
                    if self.only_create_new && item.attribute("Version").is_some() {
                        debug!("Keeping existing build metadata '{name}'");
                        continue;
                    }
                    let previous = item.set_attribute("Version", version.as_str());
                    match &previous {
                        Some(old) => {
                            info!("Changing build metadata '{name}' from '{old}' to '{version}'");
                        }
                        None => info!("Setting build metadata '{name}' to '{version}'"),
                    }
                    ValueChange::from_previous(name, previous, version)
                }
            };
            observer.value_changed(&change);
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
    use appx_schema::namespace::{BUILD, FOUNDATION};
    use std::sync::Arc;

    fn manifest(metadata: &str) -> ManifestDocument {
        format!(
            r#"<Package xmlns="{FOUNDATION}" xmlns:build="{BUILD}" IgnorableNamespaces="build"><Identity Name="App"/>{metadata}</Package>"#
        )
        .parse()
        .unwrap()
    }

    fn item_version<'a>(doc: &'a ManifestDocument, name: &str) -> Option<&'a str> {
        doc.root()
            .child(Some(BUILD), "Metadata")?
            .elements()
            .find(|e| e.attribute("Name") == Some(name))?
            .attribute("Version")
    }

    #[test]
    fn test_creates_metadata_element() {
        let mut doc: ManifestDocument = format!(r#"<Package xmlns="{FOUNDATION}"/>"#).parse().unwrap();
        let recorder = Arc::new(RecordingObserver::new());
        ManifestEditor::new(&mut doc)
            .with_observer(recorder.clone())
            .apply(&SetBuildMetadata::new([("SignTool.exe", "10.0.1")]))
            .unwrap();

        assert_eq!(item_version(&doc, "SignTool.exe"), Some("10.0.1"));
        assert!(doc.to_xml_string().contains(
            r#"<build:Metadata><build:Item Name="SignTool.exe" Version="10.0.1"/></build:Metadata>"#
        ));
        assert_eq!(
            recorder.value_changes(),
            [ValueChange::Created {
                key: "SignTool.exe".into(),
                value: "10.0.1".into(),
            }]
        );
    }

    #[test]
    fn test_case_insensitive_update() {
        let mut doc = manifest(r#"<build:Metadata><build:Item Name="makeappx.EXE" Version="1"/></build:Metadata>"#);
        let recorder = Arc::new(RecordingObserver::new());
        ManifestEditor::new(&mut doc)
            .with_observer(recorder.clone())
            .apply(&SetBuildMetadata::new([("MakeAppx.exe", "2")]))
            .unwrap();

        assert_eq!(item_version(&doc, "makeappx.EXE"), Some("2"));
        assert_eq!(doc.root().child(Some(BUILD), "Metadata").unwrap().elements().count(), 1);
        assert_eq!(
            recorder.value_changes(),
            [ValueChange::Changed {
                key: "MakeAppx.exe".into(),
                old: "1".into(),
                new: "2".into(),
            }]
        );
    }

    #[test]
    fn test_only_create_new() {
        let mut doc = manifest(
            r#"<build:Metadata><build:Item Name="A" Version="1"/><build:Item Name="B"/></build:Metadata>"#,
        );
        let recorder = Arc::new(RecordingObserver::new());
        let command = SetBuildMetadata::new([("A", "9"), ("B", "9"), ("C", "9")]).only_create_new();
        ManifestEditor::new(&mut doc)
            .with_observer(recorder.clone())
            .apply(&command)
            .unwrap();

        assert_eq!(item_version(&doc, "A"), Some("1"));
        assert_eq!(item_version(&doc, "B"), Some("9"));
        assert_eq!(item_version(&doc, "C"), Some("9"));
        let keys: Vec<_> = recorder
            .value_changes()
            .into_iter()
            .filter(|c| matches!(c, ValueChange::Created { .. }))
            .map(|c| c.key().to_string())
            .collect();
        assert_eq!(keys, ["B", "C"]);
    }

    #[test]
    fn test_empty_values_leave_document_alone() {
        let mut doc = manifest("");
        let before = doc.clone();
        ManifestEditor::new(&mut doc)
            .apply(&SetBuildMetadata::default())
            .unwrap();
        assert_eq!(doc, before);
    }
}
