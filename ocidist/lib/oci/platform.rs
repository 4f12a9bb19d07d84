use std::{env, fmt, str::FromStr};

use oci_spec::image::Platform;

use crate::OcidistError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The operating system assumed when none is given.
pub const DEFAULT_PLATFORM_OS: &str = "linux";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The platform an image is resolved for, in OCI naming (`linux/arm64/v8`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformSpec {
    os: String,
    architecture: String,
    variant: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PlatformSpec {
    /// Creates a platform from its parts.
    pub fn new(
        os: impl Into<String>,
        architecture: impl Into<String>,
        variant: Option<String>,
    ) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant,
        }
    }

    /// `linux` on the architecture this binary was built for.
    pub fn host() -> Self {
        Self::new(DEFAULT_PLATFORM_OS, host_architecture(), None)
    }

    /// Returns a copy with the architecture replaced.
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self.variant = None;
        self
    }

    /// The operating system.
    pub fn get_os(&self) -> &str {
        &self.os
    }

    /// The CPU architecture.
    pub fn get_architecture(&self) -> &str {
        &self.architecture
    }

    /// The CPU variant, if one was asked for.
    pub fn get_variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Returns true if `platform` satisfies this spec.
    ///
    /// The variant only has to match when this spec names one.
    pub fn matches(&self, platform: &Platform) -> bool {
        if platform.os().to_string() != self.os
            || platform.architecture().to_string() != self.architecture
        {
            return false;
        }

        match &self.variant {
            Some(variant) => platform.variant().as_deref() == Some(variant.as_str()),
            None => true,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps the compile-time architecture to its OCI name.
pub fn host_architecture() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for PlatformSpec {
    fn default() -> Self {
        Self::host()
    }
}

impl FromStr for PlatformSpec {
    type Err = OcidistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(OcidistError::InvalidPlatform(s.to_string()));
        }

        match parts.as_slice() {
            [arch] => Ok(Self::new(DEFAULT_PLATFORM_OS, *arch, None)),
            [os, arch] => Ok(Self::new(*os, *arch, None)),
            [os, arch, variant] => Ok(Self::new(*os, *arch, Some(variant.to_string()))),
            _ => Err(OcidistError::InvalidPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for PlatformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
