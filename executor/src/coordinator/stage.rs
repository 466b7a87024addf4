use std::fmt::Display;

use serde::Serialize;

/// Where one `execute` call is
///
/// ```text
/// Admitted -> Filtering -> Executing -> Normalizing -> Completed
///     \___________\____________\____________> Rejected | Failed
/// ```
///
/// Calls refused by the admission gate never get a stage.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Admitted,
    Filtering,
    Executing,
    Normalizing,
    Completed,
    /// turned away by the policy filter in reject mode
    Rejected,
    /// configuration fault
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Rejected | Stage::Failed)
    }
    /// whether `next` may follow `self`
    pub fn can_advance(self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Admitted, Stage::Filtering)
            | (Stage::Filtering, Stage::Executing)
            | (Stage::Executing, Stage::Normalizing)
            | (Stage::Normalizing, Stage::Completed) => true,
            (from, Stage::Rejected | Stage::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Stage::Admitted => "admitted",
                Stage::Filtering => "filtering",
                Stage::Executing => "executing",
                Stage::Normalizing => "normalizing",
                Stage::Completed => "completed",
                Stage::Rejected => "rejected",
                Stage::Failed => "failed",
            }
        )
    }
}
