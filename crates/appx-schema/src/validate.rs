//! Field validators for package identity values.
//!
//! These mirror the constraints the packaging tools enforce, so that a bad
//! value is rejected before a manifest is written rather than at pack time.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// A field value that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    /// Human-readable name of the field.
    pub field: &'static str,
    /// What is wrong with the value.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Device names Windows reserves; none may be used as a package name.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-.A-Za-z0-9]{3,50}$").expect("valid regex"));

static RESOURCE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-.A-Za-z0-9]{1,30}$").expect("valid regex"));

static PUBLISHER: LazyLock<Regex> = LazyLock::new(|| {
    let key = r"(?:CN|L|O|OU|E|C|S|STREET|T|G|I|SN|DC|SERIALNUMBER|Description|PostalCode|POBox|Phone|X21Address|dnQualifier|OID\.(?:0|[1-9][0-9]*)(?:\.(?:0|[1-9][0-9]*))+)";
    let value = r#"(?:[^,+="<>#;]+|"(?:[^"]|"")*")"#;
    let rdn = format!(r"\s*{key}\s*=\s*{value}\s*");
    Regex::new(&format!(r"^{rdn}(?:[,+]{rdn})*$")).expect("valid regex")
});

/// Validate a package `Identity@Name`.
///
/// Three to fifty characters of letters, digits, `-` and `.`; not a
/// reserved device name and not ending in a dot.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the first violated rule.
pub fn validate_package_name(name: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "package name";

    if !PACKAGE_NAME.is_match(name) {
        return Err(ValidationError::new(
            FIELD,
            format!("'{name}' must be 3-50 characters of letters, digits, '-' and '.'"),
        ));
    }
    if name.ends_with('.') {
        return Err(ValidationError::new(FIELD, format!("'{name}' must not end with '.'")));
    }
    let stem = name.split('.').next().unwrap_or(name);
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return Err(ValidationError::new(FIELD, format!("'{name}' is a reserved name")));
    }
    Ok(())
}

/// Validate a publisher distinguished name such as `CN=Contoso, O=Contoso Ltd`.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the value is empty, too long, or not a
/// sequence of known `KEY=value` pairs.
pub fn validate_publisher(publisher: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "publisher";

    if publisher.trim().is_empty() {
        return Err(ValidationError::new(FIELD, "must not be empty"));
    }
    if publisher.chars().count() > 8192 {
        return Err(ValidationError::new(FIELD, "must not exceed 8192 characters"));
    }
    if !PUBLISHER.is_match(publisher) {
        return Err(ValidationError::new(
            FIELD,
            format!("'{publisher}' is not a valid distinguished name"),
        ));
    }
    Ok(())
}

/// Validate a package `Identity@ResourceId`.
///
/// # Errors
///
/// Returns a [`ValidationError`] unless the value is 1-30 characters of
/// letters, digits, `-` and `.` not starting with a dot.
pub fn validate_resource_id(resource_id: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "resource id";

    if !RESOURCE_ID.is_match(resource_id) {
        return Err(ValidationError::new(
            FIELD,
            format!("'{resource_id}' must be 1-30 characters of letters, digits, '-' and '.'"),
        ));
    }
    if resource_id.starts_with('.') {
        return Err(ValidationError::new(
            FIELD,
            format!("'{resource_id}' must not start with '.'"),
        ));
    }
    Ok(())
}

/// Validate a literal `Identity@Version`: four components, each 0-65535.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the offending component.
pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "version";

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 4 {
        return Err(ValidationError::new(
            FIELD,
            format!("'{version}' must have exactly four components"),
        ));
    }
    for (i, part) in parts.iter().enumerate() {
        let ok = !part.is_empty()
            && part.bytes().all(|b| b.is_ascii_digit())
            && part.parse::<u32>().is_ok_and(|n| n <= u32::from(u16::MAX));
        if !ok {
            return Err(ValidationError::new(
                FIELD,
                format!("component {} of '{version}' must be a number between 0 and 65535", i + 1),
            ));
        }
    }
    Ok(())
}
