//! Processor architectures targeted by packages.

/// Processor architecture a package targets.
///
/// Manifests spell these in lowercase (`ProcessorArchitecture="x64"`,
/// `Architecture="arm64"`), but parsing is case-insensitive.
///
/// # Example
///
/// ```
/// use appx_schema::Architecture;
///
/// let arch: Architecture = "X64".parse().unwrap();
/// assert_eq!(arch.as_str(), "x64");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Architecture-independent payload.
    #[default]
    Neutral,
    /// 32-bit Intel/AMD.
    X86,
    /// 64-bit Intel/AMD.
    X64,
    /// 32-bit ARM.
    Arm,
    /// 64-bit ARM.
    Arm64,
    /// x86 binaries emulated on ARM64.
    X86a64,
}

impl Architecture {
    /// Every known architecture, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Neutral,
        Self::X86,
        Self::X64,
        Self::Arm,
        Self::Arm64,
        Self::X86a64,
    ];

    /// Manifest spelling of the architecture.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
            Self::X86a64 => "x86a64",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Ok(Self::Neutral),
            "x86" => Ok(Self::X86),
            "x64" => Ok(Self::X64),
            "arm" => Ok(Self::Arm),
            "arm64" => Ok(Self::Arm64),
            "x86a64" => Ok(Self::X86a64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}
