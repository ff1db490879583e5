//! Classification of manifest capabilities.
//!
//! Known capability names map to a fixed element name, namespace, and
//! restricted flag. Anything else is a *custom* capability, which the
//! manifest schema only accepts with a name of at least
//! [`MIN_CUSTOM_CAPABILITY_LEN`] characters.

use std::collections::HashMap;
use std::sync::LazyLock;

use thiserror::Error;

use crate::NamespaceKind;

/// Minimum length of a custom capability name.
pub const MIN_CUSTOM_CAPABILITY_LEN: usize = 15;

/// Namespace version of the UAP family that hosts `CustomCapability`.
pub const CUSTOM_CAPABILITY_UAP_VERSION: u8 = 4;

/// Errors produced while classifying a capability name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// An unknown (custom) capability name is too short.
    #[error(
        "The name of a custom capability must be at least {MIN_CUSTOM_CAPABILITY_LEN} characters long. Capability '{name}' has only {len} characters."
    )]
    InvalidCustomName {
        /// The rejected name.
        name: String,
        /// Its length in characters.
        len: usize,
    },
}

/// How a capability is declared in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// A restricted `<Capability>`; inserted before all other capabilities.
    Restricted,
    /// A general `<Capability>`.
    General,
    /// A `<DeviceCapability>`.
    Device,
    /// A `<CustomCapability>` in a versioned UAP namespace.
    Custom,
}

/// Static classification of one capability name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityEntry {
    /// Declaration shape.
    pub kind: CapabilityKind,
    /// Namespace family of the element.
    pub namespace: NamespaceKind,
    /// Version suffix of the namespace, if any.
    pub version: Option<u8>,
}

impl CapabilityEntry {
    const fn restricted(namespace: NamespaceKind) -> Self {
        Self {
            kind: CapabilityKind::Restricted,
            namespace,
            version: None,
        }
    }

    const fn general(namespace: NamespaceKind, version: Option<u8>) -> Self {
        Self {
            kind: CapabilityKind::General,
            namespace,
            version,
        }
    }

    const fn device() -> Self {
        Self {
            kind: CapabilityKind::Device,
            namespace: NamespaceKind::Uap,
            version: None,
        }
    }

    const fn custom() -> Self {
        Self {
            kind: CapabilityKind::Custom,
            namespace: NamespaceKind::Uap,
            version: Some(CUSTOM_CAPABILITY_UAP_VERSION),
        }
    }

    /// Local name of the XML element declaring this capability.
    pub fn element_name(&self) -> &'static str {
        match self.kind {
            CapabilityKind::Restricted | CapabilityKind::General => "Capability",
            CapabilityKind::Device => "DeviceCapability",
            CapabilityKind::Custom => "CustomCapability",
        }
    }

    /// Whether the capability is restricted.
    pub fn is_restricted(&self) -> bool {
        self.kind == CapabilityKind::Restricted
    }

    /// Whether the capability is custom.
    pub fn is_custom(&self) -> bool {
        self.kind == CapabilityKind::Custom
    }
}

/// Restricted capabilities declared in the `rescap` namespace.
const RESTRICTED_RESCAP: &[&str] = &[
    "cellularDeviceIdentity",
    "deviceUnlock",
    "networkingVpnProvider",
    "inputSuppression",
    "accessoryManager",
    "appLicensing",
    "cellularMessaging",
    "userDataAccountsProvider",
    "storeLicenseManagement",
    "userPrincipalName",
    "packageManagement",
    "packagedServices",
    "uiAutomation",
    "confirmAppClose",
    "cortanaPermissions",
    "teamEditionView",
    "customInstallActions",
    "localSystemServices",
    "teamEditionDeviceCredential",
    "packagePolicySystem",
    "modifiableApp",
    "backgroundSpatialPerception",
    "phoneLineTransportManagement",
    "developmentModeNetwork",
    "unvirtualizedResources",
    "backgroundVoIP",
    "gameMonitor",
    "packageWriteRedirectionCompatibilityShim",
    "cameraProcessingExtension",
    "runFullTrust",
    "allowElevation",
    "smbios",
    "appDiagnostics",
    "devicePortalProvider",
    "networkDataUsageManagement",
    "gameBarServices",
    "broadFileSystemAccess",
    "backgroundMediaRecording",
    "oneProcessVoIP",
    "deviceManagementWapSecurityPolicies",
    "previewInkWorkspace",
    "teamEditionExperience",
    "enterpriseCloudSSO",
    "appCaptureServices",
    "startScreenManagement",
    "email",
    "expandedResources",
    "protectedApp",
    "oemPublicDirectory",
    "allAppMods",
    "previewPenWorkspace",
    "inputForegroundObservation",
    "userSystemId",
    "audioDeviceConfiguration",
    "appBroadcastServices",
    "targetedContent",
    "interopServices",
    "locationSystem",
    "secondaryAuthenticationFactor",
    "gameList",
    "previewStore",
    "xboxAccessoryManagement",
    "oemDeployment",
    "extendedBackgroundTaskTime",
    "deviceManagementDmAccount",
    "deviceManagementFoundation",
    "cortanaSpeechAccessory",
    "deviceManagementEmailAccount",
    "extendedExecutionCritical",
    "extendedExecutionBackgroundAudio",
    "firstSignInSettings",
    "extendedExecutionUnconstrained",
    "appointmentsSystem",
    "emailSystem",
    "networkDataPlanProvisioning",
    "phoneCallHistory",
    "networkConnectionManagerProvisioning",
    "chatSystem",
    "remotePassportAuthentication",
    "previewUiComposition",
    "userDataSystem",
    "slapiQueryLicenseValue",
    "packageQuery",
    "walletSystem",
    "secureAssessment",
    "smsSend",
    "inputObservation",
    "locationHistory",
    "phoneCallHistorySystem",
    "dualSimTiles",
    "cellularDeviceControl",
    "inputInjectionBrokered",
    "contactsSystem",
    "enterpriseDeviceLockdown",
    "enterpriseDataPolicy",
];

/// Restricted capabilities that live in the plain `uap` namespace.
const RESTRICTED_UAP: &[&str] = &[
    "documentsLibrary",
    "sharedUserCertificates",
    "enterpriseAuthentication",
];

/// General capabilities in the plain `uap` namespace.
const GENERAL_UAP: &[&str] = &[
    "videosLibrary",
    "appointments",
    "contacts",
    "removableStorage",
    "phoneCall",
    "userAccountInformation",
    "voipCall",
    "objects3D",
    "blockedChatMessages",
    "chat",
    "picturesLibrary",
    "musicLibrary",
];

/// General capabilities in versioned `uap` namespaces.
const GENERAL_UAP_VERSIONED: &[(&str, u8)] = &[
    ("graphicsCaptureWithoutBorder", 11),
    ("graphicsCaptureProgrammatic", 11),
    ("graphicsCapture", 6),
    ("globalMediaControl", 7),
];

/// General capabilities in the foundation namespace.
const GENERAL_FOUNDATION: &[&str] = &[
    "internetClient",
    "internetClientServer",
    "privateNetworkClientServer",
    "allJoyn",
    "codeGeneration",
];

const GENERAL_MOBILE: &[&str] = &["recordedCallsFolder"];

const GENERAL_IOT: &[&str] = &["lowLevelDevices", "systemManagement"];

const DEVICE: &[&str] = &[
    "bluetooth",
    "location",
    "microphone",
    "gazeInput",
    "radios",
    "optical",
    "lowLevel",
    "wiFiControl",
    "proximity",
    "usb",
    "serialcommunication",
    "activity",
    "humaninterfacedevice",
    "pointOfService",
    "webcam",
];

static KNOWN_CAPABILITIES: LazyLock<HashMap<&'static str, CapabilityEntry>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    for name in RESTRICTED_RESCAP {
        table.insert(*name, CapabilityEntry::restricted(NamespaceKind::RestrictedCapabilities));
    }
    for name in RESTRICTED_UAP {
        table.insert(*name, CapabilityEntry::restricted(NamespaceKind::Uap));
    }
    for name in GENERAL_UAP {
        table.insert(*name, CapabilityEntry::general(NamespaceKind::Uap, None));
    }
    for (name, version) in GENERAL_UAP_VERSIONED {
        table.insert(*name, CapabilityEntry::general(NamespaceKind::Uap, Some(*version)));
    }
    for name in GENERAL_FOUNDATION {
        table.insert(*name, CapabilityEntry::general(NamespaceKind::Foundation, None));
    }
    for name in GENERAL_MOBILE {
        table.insert(*name, CapabilityEntry::general(NamespaceKind::Mobile, None));
    }
    for name in GENERAL_IOT {
        table.insert(*name, CapabilityEntry::general(NamespaceKind::Iot, None));
    }
    for name in DEVICE {
        table.insert(*name, CapabilityEntry::device());
    }
    table
});

/// Look up a well-known capability (case-sensitive).
pub fn lookup(name: &str) -> Option<CapabilityEntry> {
    KNOWN_CAPABILITIES.get(name).copied()
}

/// Iterate all well-known capability names.
pub fn known_names() -> impl Iterator<Item = &'static str> {
    KNOWN_CAPABILITIES.keys().copied()
}

/// Classify a capability name, falling back to a custom capability.
///
/// # Errors
///
/// Returns [`CapabilityError::InvalidCustomName`] if the name is unknown and
/// shorter than [`MIN_CUSTOM_CAPABILITY_LEN`] characters.
pub fn classify(name: &str) -> Result<CapabilityEntry, CapabilityError> {
    if let Some(entry) = lookup(name) {
        return Ok(entry);
    }

    let len = name.chars().count();
    if len < MIN_CUSTOM_CAPABILITY_LEN {
        return Err(CapabilityError::InvalidCustomName {
            name: name.to_string(),
            len,
        });
    }

    Ok(CapabilityEntry::custom())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_rescap() {
        let entry = classify("runFullTrust").unwrap();
        assert!(entry.is_restricted());
        assert_eq!(entry.namespace, NamespaceKind::RestrictedCapabilities);
        assert_eq!(entry.element_name(), "Capability");
    }

    #[test]
    fn test_restricted_uap() {
        let entry = classify("documentsLibrary").unwrap();
        assert!(entry.is_restricted());
        assert_eq!(entry.namespace, NamespaceKind::Uap);
        assert_eq!(entry.version, None);
    }

    #[test]
    fn test_versioned_general() {
        let entry = classify("graphicsCaptureProgrammatic").unwrap();
        assert_eq!(entry.kind, CapabilityKind::General);
        assert_eq!(entry.version, Some(11));
        assert_eq!(classify("globalMediaControl").unwrap().version, Some(7));
        assert_eq!(classify("graphicsCapture").unwrap().version, Some(6));
    }

    #[test]
    fn test_device() {
        let entry = classify("webcam").unwrap();
        assert_eq!(entry.element_name(), "DeviceCapability");
        assert!(!entry.is_restricted());
    }

    #[test]
    fn test_mobile_and_iot() {
        assert_eq!(classify("recordedCallsFolder").unwrap().namespace, NamespaceKind::Mobile);
        assert_eq!(classify("systemManagement").unwrap().namespace, NamespaceKind::Iot);
    }

    #[test]
    fn test_foundation_general() {
        let entry = classify("internetClient").unwrap();
        assert_eq!(entry.kind, CapabilityKind::General);
        assert_eq!(entry.namespace, NamespaceKind::Foundation);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(lookup("runFullTrust").is_some());
        assert!(lookup("RunFullTrust").is_none());
    }

    #[test]
    fn test_custom_length_boundary() {
        let fourteen = "a".repeat(14);
        assert_eq!(
            classify(&fourteen),
            Err(CapabilityError::InvalidCustomName {
                name: fourteen.clone(),
                len: 14
            })
        );

        let fifteen = "Contoso.Cap_abc";
        assert_eq!(fifteen.len(), 15);
        let entry = classify(fifteen).unwrap();
        assert!(entry.is_custom());
        assert_eq!(entry.element_name(), "CustomCapability");
        assert_eq!(entry.version, Some(CUSTOM_CAPABILITY_UAP_VERSION));
    }

    #[test]
    fn test_table_size() {
        assert!(known_names().count() > 100);
    }
}
