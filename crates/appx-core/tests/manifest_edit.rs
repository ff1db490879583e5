use std::sync::Arc;

use anyhow::Result;
use appx_core::edit::{
    AddCapability, EditCommand, OverridePolicy, ProvenanceInjector, SetBuildMetadata, SetIdentity,
    ToolVersions,
};
use appx_core::observer::{EditEvent, ValueChange};
use appx_core::{ManifestDocument, ManifestEditor, ManifestSummary, RecordingObserver, identity};
use appx_schema::Architecture;
use tempfile::TempDir;

const MANIFEST: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<!-- generated by a packaging wizard -->
<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10" xmlns:uap="http://schemas.microsoft.com/appx/manifest/uap/windows10" IgnorableNamespaces="uap">
  <Identity Name="Contoso.Viewer" Publisher="CN=Contoso" Version="1.4.2.0"/>
  <Properties>
    <DisplayName>Viewer</DisplayName>
    <PublisherDisplayName>Contoso</PublisherDisplayName>
    <Logo>Assets\logo.png</Logo>
  </Properties>
  <Applications>
    <Application Id="App" Executable="viewer.exe" EntryPoint="Windows.FullTrustApplication">
      <uap:VisualElements DisplayName="Viewer" BackgroundColor="#336699" Square150x150Logo="a.png" Square44x44Logo="b.png" Description="d"/>
    </Application>
  </Applications>
  <Capabilities>
    <Capability Name="internetClient"/>
  </Capabilities>
</Package>
"##;

#[test]
fn test_edit_save_reload() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("AppxManifest.xml");
    std::fs::write(&path, MANIFEST)?;

    let mut doc = ManifestDocument::load(&path)?;
    let recorder = Arc::new(RecordingObserver::new());
    let commands: Vec<EditCommand> = vec![
        SetIdentity::new()
            .with_version("*.*.+.0")
            .with_processor_architecture(Architecture::X64)
            .into(),
        AddCapability::new("runFullTrust").into(),
        AddCapability::new("webcam").into(),
        SetBuildMetadata::new([("Pipeline", "nightly")]).into(),
    ];
    {
        let mut editor = ManifestEditor::new(&mut doc).with_observer(recorder.clone());
        editor.apply_all(&commands)?;
        ProvenanceInjector::new(ToolVersions {
            make_appx: Some("10.0.22621.1".into()),
            ..ToolVersions::default()
        })
        .with_generator("viewer-build", "1.0")
        .inject(&mut editor, OverridePolicy::Default)?;
    }
    doc.save(&path)?;

    let saved = std::fs::read_to_string(&path)?;
    assert!(saved.contains("<!-- generated by a packaging wizard -->"));
    assert!(saved.contains(r#"IgnorableNamespaces="uap rescap build""#));

    let identity = identity::resolve_path(&path)?;
    assert_eq!(identity.version.as_deref(), Some("1.4.3.0"));
    assert!(identity.targets(Architecture::X64));

    let summary = ManifestSummary::from_manifest_path(&path)?;
    assert_eq!(summary.display_name.as_deref(), Some("Viewer"));
    assert_eq!(summary.accent_color, "#336699");

    let reloaded = ManifestDocument::load(&path)?;
    let capabilities: Vec<_> = reloaded
        .root()
        .child_by_local_name("Capabilities")
        .map(|c| c.elements().filter_map(|e| e.attribute("Name")).collect())
        .unwrap_or_default();
    assert_eq!(capabilities, ["runFullTrust", "internetClient", "webcam"]);

    let changes = recorder.value_changes();
    assert!(changes.contains(&ValueChange::Changed {
        key: "Version".into(),
        old: "1.4.2.0".into(),
        new: "1.4.3.0".into(),
    }));
    assert!(changes.iter().any(|c| c.key() == "MakeAppx.exe" && c.new_value() == "10.0.22621.1"));
    let added = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, EditEvent::Capability(_)))
        .count();
    assert_eq!(added, 2);
    Ok(())
}

#[test]
fn test_failed_batch_keeps_earlier_edits() -> Result<()> {
    let mut doc: ManifestDocument = MANIFEST.parse()?;
    let commands: Vec<EditCommand> = vec![
        AddCapability::new("picturesLibrary").into(),
        SetIdentity::new().with_name("bad name!").into(),
        AddCapability::new("musicLibrary").into(),
    ];

    let result = ManifestEditor::new(&mut doc).apply_all(&commands);
    assert!(result.is_err());

    let xml = doc.to_xml_string();
    assert!(xml.contains(r#"<uap:Capability Name="picturesLibrary"/>"#));
    assert!(!xml.contains("musicLibrary"));
    assert!(xml.contains(r#"Name="Contoso.Viewer""#));
    Ok(())
}

#[tokio::test]
async fn test_async_load_and_policy_from_config() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("AppxManifest.xml");
    tokio::fs::write(&path, MANIFEST).await?;

    let policy: OverridePolicy = serde_json::from_str(r#""prefer-existing""#)?;
    let mut doc = ManifestDocument::load_async(&path).await?;
    ProvenanceInjector::default().inject(&mut ManifestEditor::new(&mut doc), policy)?;

    let xml = doc.to_xml_string();
    assert!(xml.contains(r#"xmlns:build="http://schemas.microsoft.com/developer/appx/2015/build""#));
    assert!(xml.contains(&format!(
        r#"<build:Item Name="{}" Version="{}"/>"#,
        appx_core::GENERATOR_NAME,
        appx_core::GENERATOR_VERSION
    )));
    Ok(())
}
