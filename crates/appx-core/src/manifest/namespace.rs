//! Namespace bookkeeping on the manifest root.
//!
//! Every prefixed namespace an edit introduces is declared on the root and
//! listed in the root's `IgnorableNamespaces` attribute, so older manifest
//! consumers can skip elements they do not understand. All of that goes
//! through [`NamespaceRegistry`], which holds the document exclusively for
//! the duration of a command.

use appx_schema::NamespaceKind;
use tracing::debug;

use super::{Element, ManifestDocument};

/// Root attribute listing ignorable namespace prefixes.
pub const IGNORABLE_NAMESPACES: &str = "IgnorableNamespaces";

/// A namespace as it is referenced from the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceBinding {
    /// Prefix to write elements with; empty for the default namespace.
    pub prefix: String,
    /// Namespace URI.
    pub uri: String,
}

impl NamespaceBinding {
    /// The prefix, or `None` for the default namespace.
    pub fn prefix(&self) -> Option<&str> {
        (!self.prefix.is_empty()).then_some(self.prefix.as_str())
    }

    /// A new, empty element in this namespace.
    pub fn element(&self, local_name: &str) -> Element {
        Element::new_in(Some(&self.uri), self.prefix(), local_name)
    }

    /// Whether `element` is `local_name` in this namespace.
    pub fn matches(&self, element: &Element, local_name: &str) -> bool {
        element.is(Some(&self.uri), local_name)
    }
}

/// Exclusive handle on a document that keeps root namespace declarations and
/// `IgnorableNamespaces` consistent.
#[derive(Debug)]
pub struct NamespaceRegistry<'d> {
    document: &'d mut ManifestDocument,
}

impl<'d> NamespaceRegistry<'d> {
    pub fn new(document: &'d mut ManifestDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &ManifestDocument {
        self.document
    }

    pub fn root(&self) -> &Element {
        self.document.root()
    }

    pub fn root_mut(&mut self) -> &mut Element {
        self.document.root_mut()
    }

    /// Namespace and prefix of the root element itself.
    pub fn root_binding(&self) -> NamespaceBinding {
        let root = self.document.root();
        NamespaceBinding {
            prefix: root.prefix().unwrap_or_default().to_string(),
            uri: root.namespace().unwrap_or_default().to_string(),
        }
    }

    /// Make sure `kind` (at `version`, if given) can be referenced from the
    /// document, declaring it on the root when needed.
    pub fn ensure(&mut self, kind: NamespaceKind, version: Option<u8>) -> NamespaceBinding {
        let uri = kind.uri(version);
        self.ensure_uri(&uri, kind.preferred_prefix(), version)
    }

    /// [`NamespaceRegistry::ensure`] for an arbitrary URI.
    ///
    /// The document's default namespace is returned unprefixed and never
    /// listed as ignorable. A prefix already declared on the root for `uri`
    /// is reused. Otherwise a new prefix is declared: `preferred_prefix`, or
    /// `<preferred_prefix><version>` for a versioned namespace, followed by a
    /// number if that is already bound to a different URI.
    pub fn ensure_uri(
        &mut self,
        uri: &str,
        preferred_prefix: &str,
        version: Option<u8>,
    ) -> NamespaceBinding {
        let root = self.document.root_mut();

        if root.default_namespace() == Some(uri) {
            return NamespaceBinding {
                prefix: String::new(),
                uri: uri.to_string(),
            };
        }

        let prefix = if let Some(existing) = root.prefix_for(uri) {
            existing.to_string()
        } else {
            let prefix = free_prefix(root, preferred_prefix, version);
            debug!("Declaring namespace xmlns:{prefix}=\"{uri}\"");
            root.declare_namespace(&prefix, uri);
            prefix
        };

        mark_ignorable(root, &prefix);

        NamespaceBinding {
            prefix,
            uri: uri.to_string(),
        }
    }
}

fn free_prefix(root: &Element, preferred: &str, version: Option<u8>) -> String {
    let taken = |candidate: &str| root.namespace_declarations().any(|(p, _)| p == candidate);

    let base = match version {
        Some(version) => format!("{preferred}{version}"),
        None => preferred.to_string(),
    };
    if !taken(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn mark_ignorable(root: &mut Element, prefix: &str) {
    let updated = match root.attribute(IGNORABLE_NAMESPACES) {
        Some(current) if current.split_whitespace().any(|p| p == prefix) => return,
        Some(current) if current.trim().is_empty() => prefix.to_string(),
        Some(current) => format!("{} {prefix}", current.trim_end()),
        None => prefix.to_string(),
    };
    root.set_attribute(IGNORABLE_NAMESPACES, updated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use appx_schema::namespace::{FOUNDATION, RESTRICTED_CAPABILITIES, UAP};

    fn document(attrs: &str) -> ManifestDocument {
        format!(r#"<Package xmlns="{FOUNDATION}" {attrs}><Identity/></Package>"#)
            .parse()
            .unwrap()
    }

    #[test]
    fn test_default_namespace_is_unprefixed() {
        let mut doc = document("");
        let before = doc.clone();
        let binding = NamespaceRegistry::new(&mut doc).ensure(NamespaceKind::Foundation, None);
        assert_eq!(binding.prefix(), None);
        assert_eq!(binding.uri, FOUNDATION);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_declares_and_marks_ignorable() {
        let mut doc = document("");
        let binding =
            NamespaceRegistry::new(&mut doc).ensure(NamespaceKind::RestrictedCapabilities, None);
        assert_eq!(binding.prefix(), Some("rescap"));
        assert_eq!(doc.root().prefix_for(RESTRICTED_CAPABILITIES), Some("rescap"));
        assert_eq!(doc.root().attribute(IGNORABLE_NAMESPACES), Some("rescap"));
    }

    #[test]
    fn test_idempotent() {
        let mut doc = document(r#"IgnorableNamespaces="uap""#);
        let mut registry = NamespaceRegistry::new(&mut doc);
        let first = registry.ensure(NamespaceKind::Build, None);
        let second = registry.ensure(NamespaceKind::Build, None);
        assert_eq!(first, second);
        assert_eq!(doc.root().attribute(IGNORABLE_NAMESPACES), Some("uap build"));
        assert_eq!(doc.root().namespace_declarations().count(), 2);
    }

    #[test]
    fn test_reuses_existing_prefix() {
        let mut doc = document(&format!(r#"xmlns:u="{UAP}""#));
        let binding = NamespaceRegistry::new(&mut doc).ensure(NamespaceKind::Uap, None);
        assert_eq!(binding.prefix(), Some("u"));
        assert_eq!(doc.root().attribute(IGNORABLE_NAMESPACES), Some("u"));
    }

    #[test]
    fn test_versioned_namespace_prefix() {
        let mut doc = document(&format!(r#"xmlns:uap="{UAP}""#));
        let binding = NamespaceRegistry::new(&mut doc).ensure(NamespaceKind::Uap, Some(4));
        assert_eq!(binding.prefix(), Some("uap4"));
        assert_eq!(binding.uri, format!("{UAP}/4"));
    }

    #[test]
    fn test_numbered_fallback() {
        let mut doc = document(r#"xmlns:build="urn:other""#);
        let binding = NamespaceRegistry::new(&mut doc).ensure(NamespaceKind::Build, None);
        assert_eq!(binding.prefix(), Some("build_2"));
    }
}
