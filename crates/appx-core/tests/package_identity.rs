use std::io::Write;
use std::path::Path;

use anyhow::Result;
use appx_core::identity::{self, IdentityError};
use appx_core::{ManifestSummary, PackageFileSystem};
use appx_schema::Architecture;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const FOUNDATION: &str = "http://schemas.microsoft.com/appx/manifest/foundation/windows10";
const BUNDLE: &str = "http://schemas.microsoft.com/appx/2013/bundle";

fn package_manifest() -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="{FOUNDATION}" xmlns:rescap="http://schemas.microsoft.com/appx/manifest/foundation/windows10/restrictedcapabilities" IgnorableNamespaces="rescap">
  <Identity Name="Contoso.Editor" Publisher="CN=Contoso" Version="2.1.0.0" ProcessorArchitecture="x64"/>
  <Properties>
    <DisplayName>Contoso Editor</DisplayName>
    <PublisherDisplayName>Contoso Ltd.</PublisherDisplayName>
    <Logo>Assets\StoreLogo.png</Logo>
  </Properties>
  <Applications>
    <Application Id="App" Executable="editor.exe" EntryPoint="Windows.FullTrustApplication"/>
  </Applications>
  <Capabilities>
    <rescap:Capability Name="runFullTrust"/>
  </Capabilities>
</Package>
"#
    )
}

fn write_archive(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let mut zip = ZipWriter::new(std::fs::File::create(path)?);
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(data)?;
    }
    zip.finish()?;
    Ok(())
}

#[test]
fn test_package_on_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("editor.msix");
    let manifest = package_manifest();
    write_archive(
        &path,
        &[
            ("AppxManifest.xml", manifest.as_bytes()),
            ("editor.exe", b"MZ"),
            ("Assets/StoreLogo.scale-200.png", b"png"),
        ],
    )?;

    let identity = identity::resolve_path(&path)?;
    assert_eq!(identity.name.as_deref(), Some("Contoso.Editor"));
    assert_eq!(identity.publisher.as_deref(), Some("CN=Contoso"));
    assert_eq!(identity.version.as_deref(), Some("2.1.0.0"));
    assert!(identity.targets(Architecture::X64));

    let mut fs = PackageFileSystem::from_path(&path);
    let summary = ManifestSummary::from_package(&mut fs)?;
    assert_eq!(summary.display_name.as_deref(), Some("Contoso Editor"));
    assert!(fs.get_resource("Assets/StoreLogo.png")?.is_some());
    fs.close();
    Ok(())
}

#[test]
fn test_bundle_on_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("editor.msixbundle");
    let manifest = format!(
        r#"<Bundle xmlns="{BUNDLE}" SchemaVersion="5.0">
  <Identity Name="Contoso.Editor" Publisher="CN=Contoso" Version="2.1.0.0"/>
  <Packages>
    <Package Type="application" FileName="editor_x86.msix" Architecture="x86"/>
    <Package Type="application" FileName="editor_x64.msix" Architecture="x64"/>
    <Package Type="resource" FileName="editor_scale-200.msix" ResourceId="split.scale-200"/>
  </Packages>
</Bundle>"#
    );
    write_archive(
        &path,
        &[("AppxMetadata/AppxBundleManifest.xml", manifest.as_bytes())],
    )?;

    let identity = identity::resolve_path(&path)?;
    assert_eq!(identity.name.as_deref(), Some("Contoso.Editor"));
    assert_eq!(
        identity.architectures.iter().copied().collect::<Vec<_>>(),
        [Architecture::X86, Architecture::X64]
    );
    Ok(())
}

#[test]
fn test_renamed_package_is_sniffed_from_stream() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("download.bin");
    let manifest = package_manifest();
    write_archive(&path, &[("AppxManifest.xml", manifest.as_bytes())])?;

    let err = identity::resolve_path(&path).unwrap_err();
    assert!(matches!(err, IdentityError::UnsupportedInput(_)));

    let identity = identity::resolve_reader(std::fs::File::open(&path)?)?;
    assert_eq!(identity.name.as_deref(), Some("Contoso.Editor"));
    Ok(())
}

#[test]
fn test_loose_manifest_by_file_name() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("appxmanifest.xml");
    std::fs::write(&path, package_manifest())?;
    let identity = identity::resolve_path(&path)?;
    assert_eq!(identity.version.as_deref(), Some("2.1.0.0"));

    let other = dir.path().join("settings.xml");
    std::fs::write(&other, package_manifest())?;
    assert!(matches!(
        identity::resolve_path(&other),
        Err(IdentityError::UnsupportedInput(_))
    ));
    Ok(())
}

#[test]
fn test_archive_without_manifest() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("empty.appx");
    write_archive(&path, &[("readme.txt", b"hello")])?;

    let err = identity::resolve_path(&path).unwrap_err();
    assert!(matches!(err, IdentityError::NotAPackage { .. }));
    Ok(())
}

#[test]
fn test_missing_file() {
    let err = identity::resolve_path("/nonexistent/app.msix").unwrap_err();
    assert!(matches!(err, IdentityError::FileNotFound(_)));
}

#[tokio::test]
async fn test_resolve_async() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("editor.appx");
    let manifest = package_manifest();
    write_archive(&path, &[("AppxManifest.xml", manifest.as_bytes())])?;

    let identity = identity::resolve_path_async(path).await?;
    assert_eq!(identity.name.as_deref(), Some("Contoso.Editor"));
    assert_eq!(
        serde_json::to_value(&identity)?["architectures"],
        serde_json::json!(["x64"])
    );
    Ok(())
}
