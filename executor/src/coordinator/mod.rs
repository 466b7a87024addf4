//! Filter, run and normalize one submission under the admission ceiling
mod admission;
mod stage;

use serde::Serialize;

use crate::{
    init::{self, config::GlobalConfig},
    normalize::{normalize, ExecutionResult},
    policy::{Filter, PolicyMode},
    sandbox::{ExecutionLimits, Sandbox},
    submission::{Submission, SubmissionId},
    Error,
};

use admission::Gate;

pub use stage::Stage;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatistic {
    pub running: usize,
    pub max_concurrent: usize,
    /// processes spawned since start
    pub spawned: u64,
}

/// Built once from config and shared by reference (usually behind an `Arc`)
pub struct Coordinator {
    filter: Filter,
    mode: PolicyMode,
    limits: ExecutionLimits,
    sandbox: Sandbox,
    gate: Gate,
}

impl Coordinator {
    pub fn new(config: GlobalConfig) -> Result<Self, init::Error> {
        config.limits.validate()?;
        if config.admission.max_concurrent == 0 {
            return Err(init::Error::SystemIncapable(
                "admission.max_concurrent must be greater than zero".to_owned(),
            ));
        }
        let filter = Filter::new(config.policy.rules.clone())?;
        Ok(Self {
            filter,
            mode: config.policy.mode,
            sandbox: Sandbox::new(&config)?,
            gate: Gate::new(
                config.admission.max_concurrent,
                config.admission.per_submitter,
            ),
            limits: config.limits,
        })
    }
    /// configured default limits
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }
    pub fn filter(&self) -> &Filter {
        &self.filter
    }
    /// Execute `submission`, with the configured limits if `limits` is `None`
    ///
    /// Timeouts, cancellation and failing user code are all reported in the
    /// returned [`ExecutionResult`]; only capacity, policy rejection and
    /// configuration faults are errors.
    pub async fn execute(
        &self,
        submission: Submission,
        limits: Option<ExecutionLimits>,
    ) -> crate::Result<ExecutionResult> {
        let limits = limits.unwrap_or_else(|| self.limits.clone());
        limits.validate()?;

        let id = submission.id();
        let mut ticket = self.gate.admit(&submission).map_err(|err| {
            log::debug!("submission {} turned away: {}", id, err);
            err
        })?;
        log::debug!(
            "submission {} from {} admitted",
            id,
            submission.submitter()
        );

        ticket.advance(Stage::Filtering);
        let violations = self.filter.check(submission.source());
        if !violations.is_empty() {
            log::debug!(
                "submission {} has {} policy violations",
                id,
                violations.len()
            );
            if self.mode == PolicyMode::Reject {
                ticket.advance(Stage::Rejected);
                return Err(Error::PolicyRejected(violations));
            }
        }

        ticket.advance(Stage::Executing);
        let raw = match self
            .sandbox
            .run(
                &id.to_string(),
                submission.source(),
                &limits,
                ticket.take_listener(),
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("submission {} failed to execute: {}", id, err);
                ticket.advance(Stage::Failed);
                return Err(err.into());
            }
        };

        ticket.advance(Stage::Normalizing);
        let result = normalize(raw, limits.output_limit(), violations);
        ticket.advance(Stage::Completed);
        log::debug!(
            "submission {} completed in {}ms, exit code {:?}",
            id,
            result.duration_ms,
            result.exit_code
        );
        Ok(result)
    }
    /// Request cancellation of an in-flight submission
    pub fn cancel(&self, id: SubmissionId) -> bool {
        self.gate.cancel(id)
    }
    /// Stage of an in-flight submission
    ///
    /// `None` for ids that were never admitted, including calls turned away
    /// with [`Error::CapacityExceeded`], and for calls that already returned:
    /// the entry leaves together with the admission slot, so terminal stages
    /// are only visible to the call itself.
    pub fn stage(&self, id: SubmissionId) -> Option<Stage> {
        self.gate.stage(id)
    }
    pub fn usage(&self) -> AdmissionStatistic {
        AdmissionStatistic {
            running: self.gate.running(),
            max_concurrent: self.gate.max_concurrent(),
            spawned: self.sandbox.spawned(),
        }
    }
}
