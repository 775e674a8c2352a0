//! Runs a set of patches against one client and collects their outcomes.
//!
//! Patches run one after the other: later ones may read bytes an earlier one
//! wrote, and they share the backup the first mutation created. Callers must
//! not run two orchestrations against the same target at once.

use std::fmt;

use indexmap::IndexSet;

use crate::{
    config::PatchConfig,
    detect::{probe_file, ClientProbe},
    error::PatchError,
    patch::{Applied, PatchContext, PatchKind},
    tools::ExternalTools,
};

#[derive(Debug)]
pub enum PatchStatus {
    /// The target's bytes were changed.
    Applied { details: String },
    /// Backup made; the edit is left to an operator.
    Delegated { instructions: Vec<String> },
    /// A precondition was unmet. Nothing was attempted.
    Skipped { reason: String },
    Failed { error: PatchError },
}

#[derive(Debug)]
pub struct PatchOutcome {
    pub kind: PatchKind,
    pub status: PatchStatus,
}

impl PatchOutcome {
    /// Applied and delegated patches both count as successes.
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            PatchStatus::Applied { .. } | PatchStatus::Delegated { .. }
        )
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            PatchStatus::Applied { details } => write!(f, "{}: applied ({details})", self.kind),
            PatchStatus::Delegated { .. } => {
                write!(f, "{}: backup created, manual steps required", self.kind)
            }
            PatchStatus::Skipped { reason } => write!(f, "{}: skipped ({reason})", self.kind),
            PatchStatus::Failed { error } => write!(f, "{}: failed ({error})", self.kind),
        }
    }
}

/// Outcomes of one run, in execution order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<PatchOutcome>,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&PatchStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, PatchStatus::Applied { .. }))
    }

    pub fn delegated(&self) -> usize {
        self.count(|s| matches!(s, PatchStatus::Delegated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PatchStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PatchStatus::Failed { .. }))
    }

    pub fn outcome(&self, kind: PatchKind) -> Option<&PatchOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} patches succeeded ({} applied, {} delegated, {} skipped, {} failed)",
            self.succeeded(),
            self.total(),
            self.applied(),
            self.delegated(),
            self.skipped(),
            self.failed()
        )
    }
}

pub struct Orchestrator<'a> {
    tools: &'a dyn ExternalTools,
}

impl<'a> Orchestrator<'a> {
    pub fn new(tools: &'a dyn ExternalTools) -> Self {
        Self { tools }
    }

    /// Runs `config.selected_patches` in their configured order.
    pub fn run_selected<F>(&self, config: &PatchConfig, reporter: F) -> RunReport
    where
        F: FnMut(&PatchOutcome),
    {
        self.run(config, config.selected_patches.iter().copied(), reporter)
    }

    /// Validates and applies each of `kinds` in order, calling `reporter` once
    /// per outcome. Duplicate kinds run once. A failing patch never stops the
    /// ones after it.
    pub fn run<I, F>(&self, config: &PatchConfig, kinds: I, mut reporter: F) -> RunReport
    where
        I: IntoIterator<Item = PatchKind>,
        F: FnMut(&PatchOutcome),
    {
        let kinds: IndexSet<PatchKind> = kinds.into_iter().collect();

        let target = &config.target_binary_path;
        let probe: Option<ClientProbe> = target.is_file().then(|| probe_file(target));
        if let Some(probe) = &probe {
            log::info!(
                "Detected {} client, version {}",
                probe.variant,
                probe.build_version.as_deref().unwrap_or("unknown")
            );
        }

        let ctx = PatchContext {
            config,
            metadata: config.metadata(probe.as_ref().map(|p| p.variant)),
            build_version: probe.as_ref().and_then(|p| p.build_version.as_deref()),
            tools: self.tools,
        };

        let mut report = RunReport::default();
        for kind in kinds {
            let outcome = PatchOutcome {
                kind,
                status: run_one(kind, &ctx),
            };
            reporter(&outcome);
            report.outcomes.push(outcome);
        }

        log::debug!("Patch run finished: {report}");
        report
    }
}

fn run_one(kind: PatchKind, ctx: &PatchContext<'_>) -> PatchStatus {
    let patch = kind.operation();
    if let Err(e) = patch.validate(ctx) {
        log::debug!("Skipping {kind} patch: {e}");
        return PatchStatus::Skipped { reason: e.reason };
    }

    match patch.apply(ctx) {
        Ok(Applied::Modified { details }) => PatchStatus::Applied { details },
        Ok(Applied::Delegated { instructions }) => PatchStatus::Delegated { instructions },
        Err(error) => PatchStatus::Failed { error },
    }
}
