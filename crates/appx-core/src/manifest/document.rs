use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use appx_schema::PackageKind;
use tracing::debug;

use super::xml::{self, Element, Node, XmlError};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// An in-memory package or bundle manifest.
///
/// A document always has exactly one root element; parsing rejects input
/// without one. Serializing an unmodified document reproduces its input,
/// apart from a leading byte-order mark and `<a></a>` pairs, which are
/// written as `<a/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl ManifestDocument {
    /// A new document with an XML declaration and the given root.
    pub fn new(root: Element) -> Self {
        Self {
            prolog: vec![
                Node::Declaration(r#"xml version="1.0" encoding="utf-8""#.to_string()),
                Node::Text("\n".to_string()),
            ],
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse a document from raw bytes (UTF-8, optionally with a BOM).
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Encoding`] for non-UTF-8 input and any parse error
    /// of the document itself.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
            return Err(XmlError::Encoding(
                "UTF-16 documents are not supported".to_string(),
            ));
        }
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = std::str::from_utf8(bytes).map_err(|e| XmlError::Encoding(e.to_string()))?;
        Self::parse_str(text)
    }

    /// Parse a document from text.
    ///
    /// # Errors
    ///
    /// See [`ManifestDocument::parse`].
    pub fn parse_str(text: &str) -> Result<Self, XmlError> {
        let parsed = xml::parse(text)?;
        Ok(Self {
            prolog: parsed.prolog,
            root: parsed.root,
            epilog: parsed.epilog,
        })
    }

    /// Read the whole of `reader` and parse it.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Io`] if reading fails, or any parse error.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, XmlError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    /// Load a document from a file.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Io`] if the file cannot be read, or any parse error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, XmlError> {
        let path = path.as_ref();
        debug!("Loading manifest {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Load a document from a file without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// See [`ManifestDocument::load`].
    pub async fn load_async(path: impl AsRef<Path>) -> Result<Self, XmlError> {
        let path = path.as_ref();
        debug!("Loading manifest {}", path.display());
        let bytes = tokio::fs::read(path).await?;
        Self::parse(&bytes)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Package or bundle, judged by the root element's local name.
    pub fn kind(&self) -> Option<PackageKind> {
        match self.root.local_name() {
            "Package" => Some(PackageKind::Package),
            "Bundle" => Some(PackageKind::Bundle),
            _ => None,
        }
    }

    /// Serialize the document.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        for node in &self.prolog {
            xml::write_node(&mut out, node);
        }
        xml::write_element(&mut out, &self.root);
        for node in &self.epilog {
            xml::write_node(&mut out, node);
        }
        out
    }

    /// Serialize the document into `writer` as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Io`] if writing fails.
    pub fn write_to(&self, mut writer: impl Write) -> Result<(), XmlError> {
        writer.write_all(self.to_xml_string().as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Write the document to a file, replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), XmlError> {
        let path = path.as_ref();
        debug!("Saving manifest {}", path.display());
        std::fs::write(path, self.to_xml_string())?;
        Ok(())
    }
}

impl FromStr for ManifestDocument {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl std::fmt::Display for ManifestDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10" IgnorableNamespaces="">
  <Identity Name="App" Version="1.0.0.0" Publisher="CN=X"/>
</Package>"#;

    #[test]
    fn test_parse_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(SAMPLE.as_bytes());
        let doc = ManifestDocument::parse(&bytes).unwrap();
        assert_eq!(doc.kind(), Some(PackageKind::Package));
        assert_eq!(doc.to_xml_string(), SAMPLE);
    }

    #[test]
    fn test_rejects_utf16() {
        let err = ManifestDocument::parse(&[0xFF, 0xFE, b'<', 0]).unwrap_err();
        assert!(matches!(err, XmlError::Encoding(_)));
    }

    #[test]
    fn test_new_document() {
        let doc = ManifestDocument::new(Element::new("Bundle"));
        assert_eq!(doc.kind(), Some(PackageKind::Bundle));
        assert_eq!(
            doc.to_xml_string(),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Bundle/>"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AppxManifest.xml");
        let doc: ManifestDocument = SAMPLE.parse().unwrap();
        doc.save(&path).unwrap();
        assert_eq!(ManifestDocument::load(&path).unwrap(), doc);
    }

    #[tokio::test]
    async fn test_load_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AppxManifest.xml");
        std::fs::write(&path, SAMPLE).unwrap();
        let doc = ManifestDocument::load_async(&path).await.unwrap();
        assert_eq!(doc.root().local_name(), "Package");
    }
}
