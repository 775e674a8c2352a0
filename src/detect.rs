//! Best-effort classification of client builds.
//!
//! This is a content sniff, not a format parser: it looks for subsystem names
//! that only appear in the later, launcher-based builds.

use std::{fmt, fs, path::Path};

use memchr::memmem;
use pelite::{pe32::Pe as _, pe64::Pe as _, PeFile, Wrap};
use serde::{Deserialize, Serialize};

/// Structurally distinct client generations, each with its own patch procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildVariant {
    /// 2018-era clients. The default whenever detection is inconclusive.
    Early,
    /// 2019-2021 clients, split into a launcher and a web API service.
    Late,
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Early => "2018 (early)",
            Self::Late => "2019-2021 (late)",
        })
    }
}

pub const LAUNCHER_MARKER: &[u8] = b"GameLauncher";
pub const API_SERVICE_MARKER: &[u8] = b"HttpRbxApiService";

/// Classifies a client from its raw bytes. Both markers must be present for a
/// [`BuildVariant::Late`] verdict.
pub fn detect(bytes: &[u8]) -> BuildVariant {
    let has_launcher = memmem::find(bytes, LAUNCHER_MARKER).is_some();
    let has_api_service = memmem::find(bytes, API_SERVICE_MARKER).is_some();

    match (has_launcher, has_api_service) {
        (true, true) => BuildVariant::Late,
        _ => BuildVariant::Early,
    }
}

/// Like [`detect`], but reads the file first. A file that cannot be read is
/// reported with a warning and classified as [`BuildVariant::Early`].
pub fn detect_file(path: &Path) -> BuildVariant {
    match fs::read(path) {
        Ok(bytes) => detect(&bytes),
        Err(e) => {
            log::warn!(
                "Could not read {} for client detection ({e}), assuming {}",
                path.display(),
                BuildVariant::Early
            );
            BuildVariant::Early
        }
    }
}

/// File version from the PE version resource, formatted as
/// `major.minor.patch.build` (e.g. `0.285.0.49012`).
///
/// Returns `None` for anything that is not a PE image with a version resource.
pub fn build_version(bytes: &[u8]) -> Option<String> {
    let resources = match PeFile::from_bytes(bytes).ok()? {
        Wrap::T32(file) => file.resources(),
        Wrap::T64(file) => file.resources(),
    }
    .ok()?;

    let fixed = resources.version_info().ok()?.fixed()?;
    let v = &fixed.dwFileVersion;
    Some(format!("{}.{}.{}.{}", v.Major, v.Minor, v.Patch, v.Build))
}

/// Variant and version of a client on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProbe {
    pub variant: BuildVariant,
    pub build_version: Option<String>,
}

/// Reads `path` once and runs every detector over it. Unreadable files degrade
/// the same way as [`detect_file`].
pub fn probe_file(path: &Path) -> ClientProbe {
    match fs::read(path) {
        Ok(bytes) => ClientProbe {
            variant: detect(&bytes),
            build_version: build_version(&bytes),
        },
        Err(e) => {
            log::warn!(
                "Could not read {} for client detection ({e}), assuming {}",
                path.display(),
                BuildVariant::Early
            );
            ClientProbe {
                variant: BuildVariant::Early,
                build_version: None,
            }
        }
    }
}
