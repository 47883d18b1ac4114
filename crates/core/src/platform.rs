//! Release platforms and their artifact rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A platform a release artifact is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    /// All platforms in display order.
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Mac, Platform::Linux];

    /// Parse a platform name as used in form fields, URLs and stored events.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "windows" => Ok(Self::Windows),
            "mac" => Ok(Self::Mac),
            "linux" => Ok(Self::Linux),
            other => Err(crate::Error::UnknownPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Mac => "mac",
            Self::Linux => "linux",
        }
    }

    /// File extensions accepted for this platform, including the leading dot.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Windows => &[".exe", ".zip"],
            Self::Mac => &[".dmg", ".zip"],
            Self::Linux => &[".deb", ".rpm", ".AppImage"],
        }
    }

    /// Check a client-supplied file name against the allow-list.
    ///
    /// Only the final `.`-suffix counts and the comparison ignores ASCII case,
    /// so `App.AppImage`, `app.appimage` and `SETUP.EXE` all match.
    pub fn accepts_file_name(&self, file_name: &str) -> bool {
        let Some(idx) = file_name.rfind('.') else {
            return false;
        };
        // A bare ".exe" has no stem.
        if idx == 0 {
            return false;
        }
        let ext = &file_name[idx..];
        self.allowed_extensions()
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Validate a file name, returning a descriptive error on mismatch.
    pub fn validate_file_name(&self, file_name: &str) -> crate::Result<()> {
        if self.accepts_file_name(file_name) {
            Ok(())
        } else {
            Err(crate::Error::DisallowedExtension {
                platform: self.as_str().to_string(),
                file_name: file_name.to_string(),
                allowed: self.allowed_extensions().join(", "),
            })
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}
