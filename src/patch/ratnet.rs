//! Replaces the network key of the game server.
//!
//! The key cannot be located by signature; the operator finds it with a regex
//! search and swaps in a replacement from [`KNOWN_KEYS`].

use crate::{
    config::{ClientRole, ToolKind},
    error::{PatchError, ValidationError},
    script::{Procedure, Search},
};

use super::{
    debugger, validate_common, Applicability, Applied, Patch, PatchContext, PatchDescriptor, PatchKind,
};

/// Replacement keys by server file version.
pub const KNOWN_KEYS: &[(&str, &str)] = &[
    ("0.285.0.49012", "1ro78912031q78334p81s417q586ss732s4qr2n4"),
    ("0.206.0.62042", "77on3909rpn6n323ro1274963ro43776rsn18488"),
];

pub fn known_key(build_version: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .find(|(version, _)| *version == build_version)
        .map(|(_, key)| *key)
}

pub static DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::RatnetKey,
    name: "ratnet key",
    summary: "Replaces the game server's network key",
    required_tools: &[ToolKind::Debugger],
    security_risk: false,
    applicability: Applicability::Role(ClientRole::ServiceHost),
};

const PROCEDURE: Procedure = Procedure {
    search: Search::Regex("^.[A-Za-z0-9]{40}.$"),
    every_result: false,
    edit: "Locate the original key in the dump and replace it with the appropriate key",
};

pub struct RatnetKey;

impl RatnetKey {
    pub fn instructions(&self, ctx: &PatchContext<'_>) -> Vec<String> {
        let mut instructions = match ctx.build_version {
            Some(version) => match known_key(version) {
                Some(key) => vec![format!("Replacement key for build {version}: {key}")],
                None => unknown_build(version),
            },
            None => unknown_build("of unknown version"),
        };
        instructions.extend(PROCEDURE.steps(ctx.target()));
        instructions
    }
}

fn unknown_build(build: &str) -> Vec<String> {
    let mut lines = vec![format!("No known key for build {build}. Known keys:")];
    lines.extend(
        KNOWN_KEYS
            .iter()
            .map(|(version, key)| format!("  {version}: {key}")),
    );
    lines
}

impl Patch for RatnetKey {
    fn kind(&self) -> PatchKind {
        PatchKind::RatnetKey
    }

    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
        validate_common(PatchKind::RatnetKey, ctx)
    }

    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        debugger::delegate(ctx, None, self.instructions(ctx))
    }
}
