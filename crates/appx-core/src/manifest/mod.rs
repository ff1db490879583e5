//! Manifest documents: parsing, serialization, and namespace bookkeeping.

mod document;
pub mod namespace;
pub mod xml;

pub use document::ManifestDocument;
pub use namespace::{NamespaceBinding, NamespaceRegistry};
pub use xml::{Attribute, Element, Node, XmlError};
