use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

/// Source text handed in by a learner
///
/// Immutable once built, consumed by [`crate::Coordinator::execute`].
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct Submission {
    #[builder(setter(into))]
    source: String,
    submitter: i64,
    #[builder(default)]
    id: SubmissionId,
}

impl Submission {
    pub fn new(source: impl Into<String>, submitter: i64) -> Self {
        Self {
            source: source.into(),
            submitter,
            id: SubmissionId::new(),
        }
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn submitter(&self) -> i64 {
        self.submitter
    }
    pub fn id(&self) -> SubmissionId {
        self.id
    }
}
