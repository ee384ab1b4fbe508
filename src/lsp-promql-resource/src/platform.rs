//! Typed operating system / architecture keys.

use std::fmt;

/// Operating systems with published releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
}

impl Os {
    /// Detect the operating system this crate was compiled for.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }

    /// Name used in release artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "darwin",
            Self::Linux => "linux",
        }
    }
}

/// CPU architectures with published releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    X86,
    Arm64,
}

impl Arch {
    /// Detect the architecture this crate was compiled for.
    pub fn current() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Arm64)
        } else {
            None
        }
    }

    /// Name used in release artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X64 => "amd64",
            Self::X86 => "386",
            Self::Arm64 => "arm64",
        }
    }
}

/// An (os, arch) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform of the running process, if it is one we know about.
    pub fn current() -> Option<Self> {
        Some(Self::new(Os::current()?, Arch::current()?))
    }

    /// Human-readable key for the running platform, even when unsupported.
    pub fn current_key() -> String {
        match Self::current() {
            Some(platform) => platform.to_string(),
            None => format!("{}_{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os.as_str(), self.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::new(Os::Linux, Arch::X64).to_string(), "linux_amd64");
        assert_eq!(Platform::new(Os::MacOs, Arch::Arm64).to_string(), "darwin_arm64");
        assert_eq!(Platform::new(Os::Windows, Arch::X86).to_string(), "windows_386");
    }

    #[test]
    fn test_current_platform() {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        assert_eq!(Platform::current(), Some(Platform::new(Os::Linux, Arch::X64)));

        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        assert_eq!(Platform::current(), Some(Platform::new(Os::MacOs, Arch::Arm64)));

        assert!(!Platform::current_key().is_empty());
    }
}
