//! Run untrusted learner submissions under a wall-clock watchdog, bounded
//! output capture and an admission ceiling.
//!
//! A [`Coordinator`] is built once from a [`init::config::GlobalConfig`] and
//! shared by handle; every call goes through policy filtering, the sandbox
//! and the result normalizer.
pub mod coordinator;
pub mod error;
pub mod init;
pub mod normalize;
pub mod policy;
pub mod sandbox;
pub mod submission;
#[cfg(test)]
mod test;

pub use coordinator::Coordinator;
pub use error::Error;
pub use normalize::ExecutionResult;
pub use submission::{Submission, SubmissionId};

pub type Result<T> = std::result::Result<T, Error>;
