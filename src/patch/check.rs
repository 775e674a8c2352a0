//! Patches that disable a request check by turning its conditional jump into
//! an unconditional one.
//!
//! The checks live in optimized code without a stable byte signature, so the
//! edit is done through the debugger. [`Blocking`](PatchKind::Blocking),
//! [`InvalidRequest`](PatchKind::InvalidRequest) and
//! [`TrustCheck`](PatchKind::TrustCheck) only differ in the string that leads
//! to the check.

use std::path::Path;

use crate::{
    config::ToolKind,
    detect::BuildVariant,
    error::{PatchError, ValidationError},
    script::{self, Procedure, Search, SECURITY_WARNING},
};

use super::{
    debugger, validate_common, Applicability, Applied, Patch, PatchContext, PatchDescriptor, PatchKind,
};

const JUMP_NEAR_RESULT: &str = "Find 'je' (or 'jne') instructions near the result and replace with 'jmp'";
const JUMP_ABOVE_RESULT: &str =
    "Find 'je' (or 'jne') instructions a few lines above the result and replace with 'jmp'";

/// How the automation script locates the check.
#[derive(Debug, Clone, Copy)]
enum ScriptShape {
    /// A single reference, patched at the first `je` and `jne` following it.
    FirstHit(&'static str),
    /// Every reference to each needle, patched at the `je` preceding it.
    /// Late builds reword some of the messages.
    EveryHit {
        early: &'static [&'static str],
        late: &'static [&'static str],
    },
}

#[derive(Debug)]
pub struct CheckPatch {
    kind: PatchKind,
    procedure: Procedure,
    script: ScriptShape,
}

impl CheckPatch {
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Debugger script disabling the check in `target`.
    pub fn script(&self, target: &Path, variant: BuildVariant) -> String {
        match self.script {
            ScriptShape::FirstHit(needle) => script::first_hit_script(target, needle),
            ScriptShape::EveryHit { early, late } => {
                let needles = match variant {
                    BuildVariant::Early => early,
                    BuildVariant::Late => late,
                };
                script::every_hit_script(target, needles)
            }
        }
    }

    pub fn instructions(&self, target: &Path) -> Vec<String> {
        let mut instructions = Vec::with_capacity(9);
        if self.kind.descriptor().security_risk {
            instructions.push(SECURITY_WARNING.to_owned());
        }
        instructions.extend(self.procedure.steps(target));
        instructions
    }
}

impl Patch for CheckPatch {
    fn kind(&self) -> PatchKind {
        self.kind
    }

    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
        validate_common(self.kind, ctx)
    }

    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        let target = ctx.target();
        let script = self.script(target, ctx.variant());
        debugger::delegate(ctx, Some(script), self.instructions(target))
    }
}

pub static BLOCKING: CheckPatch = CheckPatch {
    kind: PatchKind::Blocking,
    procedure: Procedure {
        search: Search::Literal("blocking %s"),
        every_result: false,
        edit: JUMP_NEAR_RESULT,
    },
    script: ScriptShape::FirstHit("blocking %s"),
};

pub static INVALID_REQUEST: CheckPatch = CheckPatch {
    kind: PatchKind::InvalidRequest,
    procedure: Procedure {
        search: Search::Literal("invalid request"),
        every_result: true,
        edit: JUMP_ABOVE_RESULT,
    },
    script: ScriptShape::EveryHit {
        early: &["invalid request"],
        late: &["invalid request"],
    },
};

pub static TRUST_CHECK: CheckPatch = CheckPatch {
    kind: PatchKind::TrustCheck,
    procedure: Procedure {
        search: Search::Literal("trust check failed for %s"),
        every_result: true,
        edit: JUMP_ABOVE_RESULT,
    },
    script: ScriptShape::EveryHit {
        early: &["trust check failed for %s"],
        late: &["trust check failed", "Non-trusted BaseURL used"],
    },
};

pub static BLOCKING_DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::Blocking,
    name: "blocking",
    summary: "Disables the 'blocking %s' check on requests to unknown hosts",
    required_tools: &[ToolKind::Debugger],
    security_risk: false,
    applicability: Applicability::Always,
};

pub static INVALID_REQUEST_DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::InvalidRequest,
    name: "invalid request",
    summary: "Disables the 'invalid request' validation of external requests",
    required_tools: &[ToolKind::Debugger],
    security_risk: true,
    applicability: Applicability::Always,
};

pub static TRUST_CHECK_DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::TrustCheck,
    name: "trust check",
    summary: "Disables the trusted host check on content URLs",
    required_tools: &[ToolKind::Debugger],
    security_risk: true,
    applicability: Applicability::Always,
};
