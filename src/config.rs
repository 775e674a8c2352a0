//! Patch run configuration and the client metadata derived from it.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{detect::BuildVariant, disk::write_atomic, error::ConfigError, patch::PatchKind};

/// Which executable of a release is being patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRole {
    #[default]
    Player,
    Studio,
    /// The dedicated game server process.
    ServiceHost,
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Player => "player",
            Self::Studio => "studio",
            Self::ServiceHost => "service host",
        })
    }
}

impl FromStr for ClientRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "player" => Ok(Self::Player),
            "studio" => Ok(Self::Studio),
            "service_host" | "rcc" | "rcc_service" => Ok(Self::ServiceHost),
            _ => Err(format!("unknown client role '{s}'")),
        }
    }
}

/// External capabilities a patch may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolKind {
    /// Directory holding the key pair generator.
    KeyGenerator,
    /// Interactive debugger executable.
    Debugger,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeyGenerator => "key generator",
            Self::Debugger => "debugger",
        })
    }
}

/// Everything a patch run needs from the caller.
///
/// The configuration is not checked on construction. Each patch validates the
/// fields it depends on, e.g. the 10 byte domain required by
/// [`PatchKind::Website`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    pub target_binary_path: PathBuf,
    pub target_domain: String,
    pub release_year: i32,
    pub client_role: ClientRole,
    /// Patches to run, in order. Serialized as a list.
    pub selected_patches: IndexSet<PatchKind>,
    pub tool_paths: BTreeMap<ToolKind, Option<PathBuf>>,
    /// Run generated debugger scripts instead of only handing out manual steps.
    pub automate_debugger: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            target_binary_path: PathBuf::new(),
            target_domain: String::new(),
            release_year: 2010,
            client_role: ClientRole::default(),
            selected_patches: IndexSet::new(),
            tool_paths: BTreeMap::new(),
            automate_debugger: false,
        }
    }
}

impl PatchConfig {
    /// Configured path of `tool`. Empty paths count as unset.
    pub fn tool_path(&self, tool: ToolKind) -> Option<&Path> {
        self.tool_paths
            .get(&tool)
            .and_then(|p| p.as_deref())
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn set_tool_path(&mut self, tool: ToolKind, path: Option<PathBuf>) {
        self.tool_paths.insert(tool, path);
    }

    pub fn metadata(&self, detected_variant: Option<BuildVariant>) -> ClientMetadata {
        ClientMetadata {
            role: self.client_role,
            release_year: self.release_year,
            detected_variant,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut text = self.to_json().map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        text.push('\n');
        write_atomic(path, text.as_bytes()).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Facts about the client a patch's applicability depends on. Fixed for the
/// duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMetadata {
    pub role: ClientRole,
    pub release_year: i32,
    pub detected_variant: Option<BuildVariant>,
}
