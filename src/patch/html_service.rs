use crate::{
    config::ToolKind,
    error::{PatchError, ValidationError},
    script::{Procedure, Search},
};

use super::{
    debugger, validate_common, Applicability, Applied, Patch, PatchContext, PatchDescriptor, PatchKind,
};

pub static DESCRIPTOR: PatchDescriptor = PatchDescriptor {
    kind: PatchKind::HtmlService,
    name: "html service",
    summary: "Re-enables HtmlService in 2008 clients",
    required_tools: &[ToolKind::Debugger],
    security_risk: false,
    applicability: Applicability::ReleaseYear(2008),
};

const PROCEDURE: Procedure = Procedure {
    search: Search::Literal("htmlservice"),
    every_result: true,
    edit: "Find 'jne' instructions a few lines above and replace with 'jmp'",
};

pub struct HtmlService;

impl Patch for HtmlService {
    fn kind(&self) -> PatchKind {
        PatchKind::HtmlService
    }

    fn validate(&self, ctx: &PatchContext<'_>) -> Result<(), ValidationError> {
        validate_common(PatchKind::HtmlService, ctx)
    }

    fn execute(&self, ctx: &PatchContext<'_>) -> Result<Applied, PatchError> {
        debugger::delegate(ctx, None, PROCEDURE.steps(ctx.target()))
    }
}
