use std::fmt::Display;

use thiserror::Error;

use crate::{
    policy::PolicyViolation,
    sandbox::{self, LimitError},
    submission::SubmissionId,
};

/// Which ceiling turned a submission away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Submitter(i64),
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Submitter(id) => write!(f, "submitter {}", id),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("too many concurrent executions ({0} ceiling)")]
    CapacityExceeded(Scope),
    #[error("submission {0} is already running")]
    AlreadyRunning(SubmissionId),
    #[error("source rejected by policy filter ({} violations)", .0.len())]
    PolicyRejected(Vec<PolicyViolation>),
    #[error("{0}")]
    Limits(#[from] LimitError),
    #[error("sandbox misconfigured: {0}")]
    Configuration(#[from] sandbox::Error),
}

impl Error {
    /// infrastructure fault rather than something about the submission
    pub fn is_system_fault(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
    /// Text safe to show the learner
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration(_) => "execution temporarily unavailable".to_owned(),
            Error::CapacityExceeded(_) => {
                "too many programs are running, try again shortly".to_owned()
            }
            x => x.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system_fault_is_generic() {
        let err = Error::Configuration(sandbox::Error::CapturedPipe);
        assert!(err.is_system_fault());
        assert_eq!(err.user_message(), "execution temporarily unavailable");

        let err = Error::CapacityExceeded(Scope::Submitter(3));
        assert!(!err.is_system_fault());
        assert_eq!(err.to_string(), "too many concurrent executions (submitter 3 ceiling)");
    }
}
