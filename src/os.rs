//! Target operating system resolution.
//!
//! A free-form `target_os` string is decoded once into an [`OsFamily`],
//! which selects an immutable [`OsProfile`] for the whole run. Decoding
//! never fails: unknown or empty names fall back to [`OsFamily::Linux`].

use std::str::FromStr;

use strum::{Display, EnumIter, EnumString};
use tracing::debug;

/// Operating system names accepted in `target_os`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TargetOs {
    Amazon,
    Arch,
    Centos,
    Debian,
    Fedora,
    Freebsd,
    Linux,
    Macos,
    Oracle,
    Photon,
    Redhat,
    Suse,
    Ubuntu,
    Windows,
}

impl TargetOs {
    /// Returns the family whose command set this OS uses.
    pub fn family(self) -> OsFamily {
        match self {
            Self::Amazon
            | Self::Arch
            | Self::Centos
            | Self::Debian
            | Self::Fedora
            | Self::Freebsd
            | Self::Linux
            | Self::Macos
            | Self::Oracle
            | Self::Photon
            | Self::Redhat
            | Self::Suse
            | Self::Ubuntu => OsFamily::Linux,
            Self::Windows => OsFamily::Windows,
        }
    }
}

/// The command dialect spoken by the target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OsFamily {
    /// POSIX shell with `sudo`.
    #[default]
    Linux,
    /// Commands wrapped for PowerShell.
    Windows,
}

impl OsFamily {
    /// Returns the profile for this family.
    pub fn profile(self) -> &'static OsProfile {
        match self {
            Self::Linux => &LINUX_PROFILE,
            Self::Windows => &WINDOWS_PROFILE,
        }
    }
}

/// Per-family defaults.
///
/// Command templates live in [`crate::command::RemoteCommand`]; the profile
/// only carries the values that are configurable by the user.
#[derive(Debug, PartialEq, Eq)]
pub struct OsProfile {
    pub family: OsFamily,
    pub default_state_dir: &'static str,
    pub default_pillar_dir: &'static str,
}

static LINUX_PROFILE: OsProfile = OsProfile {
    family: OsFamily::Linux,
    default_state_dir: "/tmp/packer-provisioner-salt/states",
    default_pillar_dir: "/tmp/packer-provisioner-salt/pillar",
};

static WINDOWS_PROFILE: OsProfile = OsProfile {
    family: OsFamily::Windows,
    default_state_dir: "C:/Windows/Temp/packer-provisioner-salt/states",
    default_pillar_dir: "C:/Windows/Temp/packer-provisioner-salt/pillar",
};

/// Resolves a declared `target_os` value to an OS family.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn resolve(target_os: &str) -> OsFamily {
    let name = target_os.trim();
    match TargetOs::from_str(name) {
        Ok(os) => os.family(),
        Err(_) => {
            if !name.is_empty() {
                debug!("unrecognized target_os '{}', defaulting to linux", name);
            }
            OsFamily::Linux
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_known_name_resolves() {
        for os in TargetOs::iter() {
            let expected = if os == TargetOs::Windows {
                OsFamily::Windows
            } else {
                OsFamily::Linux
            };
            assert_eq!(resolve(&os.to_string()), expected, "name: {}", os);
        }
    }

    #[test]
    fn test_resolve_ignores_case_and_whitespace() {
        assert_eq!(resolve("Windows"), OsFamily::Windows);
        assert_eq!(resolve("  WINDOWS "), OsFamily::Windows);
        assert_eq!(resolve("Ubuntu"), OsFamily::Linux);
    }

    #[test]
    fn test_unknown_and_empty_default_to_linux() {
        for name in ["", "   ", "solaris", "win", "windows10", "plan9"] {
            assert_eq!(resolve(name), OsFamily::Linux, "name: {:?}", name);
        }
    }

    #[test]
    fn test_profiles_match_family() {
        assert_eq!(OsFamily::Linux.profile().family, OsFamily::Linux);
        assert_eq!(OsFamily::Windows.profile().family, OsFamily::Windows);
        assert!(OsFamily::Linux.profile().default_state_dir.starts_with("/tmp/"));
        assert!(
            OsFamily::Windows
                .profile()
                .default_pillar_dir
                .starts_with("C:/Windows/Temp/")
        );
    }
}
