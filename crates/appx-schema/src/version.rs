//! Four-component package versions and version masks.
//!
//! A package version is always `Major.Minor.Build.Revision`. Build tooling
//! often wants "whatever the manifest has, with the revision bumped", so a
//! version can also be given as a *mask* resolved against the current value:
//!
//! - `+` or `^`: current component plus one
//! - `*`, `x`, or an empty component: current component unchanged
//! - a digit string: used verbatim
//! - a component past the end of the mask: `0`
//! - `auto`: `*.*.*.+` when a current version exists, otherwise `1.0.0.0`

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a version or resolving a version mask.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input is not a version string or a well-formed mask.
    #[error("The value '{0}' is not a valid version string.")]
    InvalidFormat(String),

    /// Incrementing a component would exceed the representable range.
    #[error("Version component {component} overflows when incremented in '{mask}'")]
    Overflow {
        /// The mask being resolved.
        mask: String,
        /// Zero-based index of the overflowing component.
        component: usize,
    },

    /// The resolved string did not re-parse as a version.
    #[error("Resolved version '{0}' is not a valid version string")]
    Inconsistent(String),
}

/// A four-component package version (`Major.Minor.Build.Revision`).
///
/// Parsing accepts two to four numeric components; missing trailing
/// components are zero. Display always prints all four.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct AppxVersion {
    /// First component.
    pub major: u32,
    /// Second component.
    pub minor: u32,
    /// Third component.
    pub build: u32,
    /// Fourth component.
    pub revision: u32,
}

impl AppxVersion {
    /// The version assumed when a mask is resolved without a current value.
    pub const INITIAL: Self = Self::new(1, 0, 0, 0);

    /// Create a version from its four components.
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Components in order, `[major, minor, build, revision]`.
    pub fn components(&self) -> [u32; 4] {
        [self.major, self.minor, self.build, self.revision]
    }

    fn from_components(c: [u32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl std::fmt::Display for AppxVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AppxVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(VersionError::InvalidFormat(s.to_string()));
        }

        let mut components = [0u32; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = parse_literal(part).ok_or_else(|| VersionError::InvalidFormat(s.to_string()))?;
        }

        Ok(Self::from_components(components))
    }
}

/// Parse a non-negative decimal literal. Rejects signs and whitespace,
/// which `u32::from_str` would otherwise accept in part.
fn parse_literal(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Resolve a version mask against an optional current version.
///
/// Returns the normalized four-component version string.
///
/// # Errors
///
/// Returns [`VersionError::InvalidFormat`] if the mask has more than four
/// components or a component that is neither a wildcard token nor a
/// non-negative integer, and [`VersionError::Overflow`] if `+` would
/// overflow a component.
///
/// # Example
///
/// ```
/// use appx_schema::version::{resolve_mask, AppxVersion};
///
/// let current = AppxVersion::new(1, 2, 3, 4);
/// assert_eq!(resolve_mask("*.*.*.+", Some(&current)).unwrap(), "1.2.3.5");
/// assert_eq!(resolve_mask("auto", None).unwrap(), "1.0.0.0");
/// ```
pub fn resolve_mask(mask: &str, current: Option<&AppxVersion>) -> Result<String, VersionError> {
    // A plain version ignores the current value entirely.
    if let Ok(plain) = mask.parse::<AppxVersion>() {
        return Ok(plain.to_string());
    }

    let mask = if mask.eq_ignore_ascii_case("auto") {
        if current.is_none() {
            return Ok(AppxVersion::INITIAL.to_string());
        }
        "*.*.*.+"
    } else {
        mask
    };

    let mut tokens: Vec<&str> = mask.split('.').collect();
    // A trailing dot ends the mask rather than naming an empty component.
    if tokens.len() > 1 && tokens.last() == Some(&"") {
        tokens.pop();
    }
    if tokens.len() > 4 {
        return Err(VersionError::InvalidFormat(mask.to_string()));
    }

    let current = current.copied().unwrap_or(AppxVersion::INITIAL).components();
    let mut resolved = [0u32; 4];
    for (i, slot) in resolved.iter_mut().enumerate() {
        let Some(token) = tokens.get(i) else {
            continue;
        };
        *slot = match *token {
            "+" | "^" => current[i].checked_add(1).ok_or_else(|| VersionError::Overflow {
                mask: mask.to_string(),
                component: i,
            })?,
            "*" | "x" | "" => current[i],
            literal => {
                parse_literal(literal).ok_or_else(|| VersionError::InvalidFormat(mask.to_string()))?
            }
        };
    }

    let version_string = AppxVersion::from_components(resolved).to_string();
    match version_string.parse::<AppxVersion>() {
        Ok(_) => Ok(version_string),
        Err(_) => Err(VersionError::Inconsistent(version_string)),
    }
}

/// Resolve a mask against a current value still in string form, as read
/// from a manifest attribute. An empty or absent current value means "none".
///
/// # Errors
///
/// Returns [`VersionError::InvalidFormat`] if `current` is present but not a
/// version, or any error of [`resolve_mask`].
pub fn resolve_mask_str(mask: &str, current: Option<&str>) -> Result<String, VersionError> {
    let current = match current.map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(value.parse::<AppxVersion>()?),
    };
    resolve_mask(mask, current.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: AppxVersion = AppxVersion::new(1, 2, 3, 4);

    #[test]
    fn test_parse_pads_missing_components() {
        assert_eq!("1.2".parse::<AppxVersion>(), Ok(AppxVersion::new(1, 2, 0, 0)));
        assert_eq!(
            "10.20.30.40".parse::<AppxVersion>(),
            Ok(AppxVersion::new(10, 20, 30, 40))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("1".parse::<AppxVersion>().is_err());
        assert!("1.2.3.4.5".parse::<AppxVersion>().is_err());
        assert!("1.-2.3.4".parse::<AppxVersion>().is_err());
        assert!("1.+2".parse::<AppxVersion>().is_err());
        assert!("a.b".parse::<AppxVersion>().is_err());
    }

    #[test]
    fn test_increment_revision() {
        assert_eq!(resolve_mask("*.*.*.+", Some(&CURRENT)).unwrap(), "1.2.3.5");
        assert_eq!(resolve_mask("x.x.^.x", Some(&CURRENT)).unwrap(), "1.2.4.4");
    }

    #[test]
    fn test_auto() {
        assert_eq!(resolve_mask("auto", None).unwrap(), "1.0.0.0");
        assert_eq!(resolve_mask("AUTO", None).unwrap(), "1.0.0.0");
        let two = AppxVersion::new(2, 0, 0, 0);
        assert_eq!(resolve_mask("auto", Some(&two)).unwrap(), "2.0.0.1");
    }

    #[test]
    fn test_mixed_mask_with_trailing_dot() {
        assert_eq!(resolve_mask("5.x.*.", Some(&CURRENT)).unwrap(), "5.2.3.0");
    }

    #[test]
    fn test_interior_empty_keeps_current() {
        assert_eq!(resolve_mask("7..*.1", Some(&CURRENT)).unwrap(), "7.2.3.1");
    }

    #[test]
    fn test_plain_version_ignores_current() {
        assert_eq!(resolve_mask("1.2.3.4", Some(&AppxVersion::new(9, 9, 9, 9))).unwrap(), "1.2.3.4");
        assert_eq!(resolve_mask("1.2.3.4", None).unwrap(), "1.2.3.4");
        assert_eq!(resolve_mask("3.1", Some(&CURRENT)).unwrap(), "3.1.0.0");
    }

    #[test]
    fn test_short_mask_pads_with_zero() {
        assert_eq!(resolve_mask("+", Some(&CURRENT)).unwrap(), "2.0.0.0");
        assert_eq!(resolve_mask("*.+", None).unwrap(), "1.1.0.0");
    }

    #[test]
    fn test_too_many_components() {
        assert!(matches!(
            resolve_mask("*.*.*.*.*", Some(&CURRENT)),
            Err(VersionError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_invalid_token() {
        assert!(matches!(
            resolve_mask("1.y.*.+", Some(&CURRENT)),
            Err(VersionError::InvalidFormat(_))
        ));
        assert!(matches!(
            resolve_mask("1.-1.*.+", Some(&CURRENT)),
            Err(VersionError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_overflow() {
        let max = AppxVersion::new(1, 0, 0, u32::MAX);
        assert!(matches!(
            resolve_mask("*.*.*.+", Some(&max)),
            Err(VersionError::Overflow { component: 3, .. })
        ));
    }

    #[test]
    fn test_resolve_against_string_current() {
        assert_eq!(resolve_mask_str("*.*.*.+", Some("1.0.0.9")).unwrap(), "1.0.0.10");
        assert_eq!(resolve_mask_str("auto", Some("")).unwrap(), "1.0.0.0");
        assert!(resolve_mask_str("*.*.*.+", Some("garbage")).is_err());
    }
}
