//! The patch catalog.
//!
//! Every [`PatchKind`] has a static [`PatchDescriptor`] (metadata and
//! applicability) and a static [`Patch`] implementation, both resolved through
//! the kind itself. The set is closed: adding a kind means adding a match arm
//! to [`PatchKind::descriptor`] and [`PatchKind::operation`].

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    config::{ClientMetadata, ClientRole, PatchConfig, ToolKind},
    detect::BuildVariant,
    error::{PatchError, ValidationError},
    tools::{ExternalTools, KEY_GENERATOR_EXE},
};

pub mod check;
mod debugger;
pub mod html_service;
pub mod public_key;
pub mod ratnet;
pub mod website;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchKind {
    Website,
    PublicKey,
    Blocking,
    InvalidRequest,
    TrustCheck,
    RatnetKey,
    HtmlService,
}

impl PatchKind {
    pub const ALL: [PatchKind; 7] = [
        Self::Website,
        Self::PublicKey,
        Self::Blocking,
        Self::InvalidRequest,
        Self::TrustCheck,
        Self::RatnetKey,
        Self::HtmlService,
    ];

    pub fn descriptor(self) -> &'static PatchDescriptor {
        match self {
            Self::Website => &website::DESCRIPTOR,
            Self::PublicKey => &public_key::DESCRIPTOR,
            Self::Blocking => &check::BLOCKING_DESCRIPTOR,
            Self::InvalidRequest => &check::INVALID_REQUEST_DESCRIPTOR,
            Self::TrustCheck => &check::TRUST_CHECK_DESCRIPTOR,
            Self::RatnetKey => &ratnet::DESCRIPTOR,
            Self::HtmlService => &html_service::DESCRIPTOR,
        }
    }

    /// The implementation of this kind.
    pub fn operation(self) -> &'static dyn Patch {
        match self {
            Self::Website => &website::Website,
            Self::PublicKey => &public_key::PublicKey,
            Self::Blocking => &check::BLOCKING,
            Self::InvalidRequest => &check::INVALID_REQUEST,
            Self::TrustCheck => &check::TRUST_CHECK,
            Self::RatnetKey => &ratnet::RatnetKey,
            Self::HtmlService => &html_service::HtmlService,
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

impl FromStr for PatchKind {
    type Err = String;

    /// Accepts the serialized names in any case, with `-` or `_` separators
    /// (`TRUST_CHECK`, `trust-check`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "website" => Self::Website,
            "public_key" => Self::PublicKey,
            "blocking" => Self::Blocking,
            "invalid_request" => Self::InvalidRequest,
            "trust_check" => Self::TrustCheck,
            "ratnet_key" => Self::RatnetKey,
            "html_service" => Self::HtmlService,
            _ => return Err(format!("unknown patch kind '{s}'")),
        })
    }
}

/// Client metadata a patch is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Always,
    Role(ClientRole),
    ReleaseYear(i32),
}

impl Applicability {
    pub fn allows(self, meta: &ClientMetadata) -> bool {
        match self {
            Self::Always => true,
            Self::Role(role) => meta.role == role,
            Self::ReleaseYear(year) => meta.release_year == year,
        }
    }
}

impl fmt::Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("any client"),
            Self::Role(role) => write!(f, "{role} clients only"),
            Self::ReleaseYear(year) => write!(f, "{year} clients only"),
        }
    }
}

/// Static metadata of a patch kind.
#[derive(Debug)]
pub struct PatchDescriptor {
    pub kind: PatchKind,
    pub name: &'static str,
    pub summary: &'static str,
    pub required_tools: &'static [ToolKind],
    /// The patch weakens a security check of the client.
    pub security_risk: bool,
    pub applicability: Applicability,
}

impl PatchDescriptor {
    pub fn is_applicable(&self, meta: &ClientMetadata) -> bool {
        self.applicability.allows(meta)
    }
}

/// Kinds applicable to `meta`, in catalog order.
pub fn available_kinds(meta: &ClientMetadata) -> Vec<PatchKind> {
    PatchKind::ALL
        .into_iter()
        .filter(|k| k.descriptor().is_applicable(meta))
        .collect()
}

/// The minimal set that makes a client talk to a custom endpoint.
pub fn recommended_kinds(meta: &ClientMetadata) -> Vec<PatchKind> {
    let mut kinds = vec![PatchKind::Website, PatchKind::PublicKey];
    if meta.release_year == 2008 {
        kinds.push(PatchKind::HtmlService);
    }
    if meta.role == ClientRole::ServiceHost {
        kinds.push(PatchKind::RatnetKey);
    }
    kinds
}

/// Everything an operation may look at while it runs.
pub struct PatchContext<'a> {
    pub config: &'a PatchConfig,
    pub metadata: ClientMetadata,
    /// File version of the target, when it carries a version resource.
    pub build_version: Option<&'a str>,
    pub tools: &'a dyn ExternalTools,
}

impl PatchContext<'_> {
    pub fn target(&self) -> &Path {
        &self.config.target_binary_path
    }

    /// Detected build variant, [`BuildVariant::Early`] when unknown.
    pub fn variant(&self) -> BuildVariant {
        self.metadata.detected_variant.unwrap_or(BuildVariant::Early)
    }
}

/// Result of a successful [`Patch::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Bytes of the target (or its sidecar files) were changed.
    Modified { details: String },
    /// A backup was made, but the edit itself is left to an operator following
    /// `instructions`. Nothing about the target's code has been verified.
    Delegated { instructions: Vec<String> },
}

pub trait Patch {
    fn kind(&self) -> PatchKind;

    fn descriptor(&self) -> &'static PatchDescriptor {
        self.kind().descriptor()
    }

    /// Checks the preconditions of the patch without touching the filesystem
    /// beyond existence checks.
    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError>;

    /// Internal to the patch implementation.
    ///
    /// Performs the patch. Only called by [`Patch::apply`] once
    /// [`Patch::validate`] succeeded.
    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError>;

    /// Validates, then performs the patch. A failed validation returns
    /// [`PatchError::Invalid`] before anything is written.
    fn apply(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        self.validate(ctx)?;
        log::debug!("Applying {} patch to {}", self.kind(), ctx.target().display());
        self.execute(ctx)
    }
}

/// Preconditions shared by every kind: applicability, an existing target and
/// the tools listed in the descriptor.
pub(crate) fn validate_common(kind: PatchKind, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
    let descriptor = kind.descriptor();
    if !descriptor.is_applicable(&ctx.metadata) {
        return Err(ValidationError::new(format!(
            "{kind} patch applies to {}",
            descriptor.applicability
        )));
    }

    let target = ctx.target();
    if target.as_os_str().is_empty() {
        return Err(ValidationError::new("no target binary configured"));
    }
    if !target.is_file() {
        return Err(ValidationError::new(format!(
            "target binary {} does not exist",
            target.display()
        )));
    }

    for &tool in descriptor.required_tools {
        require_tool(ctx.config, tool)?;
    }
    Ok(())
}

/// Configured path of `tool`, if it exists on disk. The key generator path is
/// a directory that must contain [`KEY_GENERATOR_EXE`].
pub(crate) fn require_tool(config: &PatchConfig, tool: ToolKind) -> Result<&Path, ValidationError> {
    let path = config
        .tool_path(tool)
        .ok_or_else(|| ValidationError::new(format!("{tool} path is not configured")))?;

    let exists = match tool {
        ToolKind::KeyGenerator => path.join(KEY_GENERATOR_EXE).is_file(),
        ToolKind::Debugger => path.is_file(),
    };
    if !exists {
        return Err(ValidationError::new(format!(
            "{tool} not found at {}",
            path.display()
        )));
    }
    Ok(path)
}
