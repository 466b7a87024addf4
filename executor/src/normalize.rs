use serde::{Deserialize, Serialize};

use crate::{policy::PolicyViolation, sandbox::RawOutcome};

/// Structured outcome of one submission
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` iff the process was killed by the watchdog
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    /// either stream reached the output limit
    pub truncated: bool,
    pub duration_ms: u64,
    pub policy_violations: Vec<PolicyViolation>,
}

/// Turn raw process output into an [`ExecutionResult`]
///
/// `limit` is the byte cap the streams were captured with.
pub fn normalize(raw: RawOutcome, limit: usize, violations: Vec<PolicyViolation>) -> ExecutionResult {
    ExecutionResult {
        stdout: decode(&raw.stdout, raw.stdout_full, limit),
        stderr: decode(&raw.stderr, raw.stderr_full, limit),
        exit_code: raw.exit_code,
        timed_out: raw.timed_out,
        cancelled: raw.cancelled,
        truncated: raw.stdout_full || raw.stderr_full,
        duration_ms: u64::try_from(raw.duration.as_millis()).unwrap_or(u64::MAX),
        policy_violations: violations,
    }
}

fn decode(bytes: &[u8], full: bool, limit: usize) -> String {
    let bytes = if full { trim_partial(bytes) } else { bytes };
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    // replacement characters can grow the text past the limit
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// Drop a multi-byte sequence cut short at the end of `bytes`
fn trim_partial(bytes: &[u8]) -> &[u8] {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if width > back {
            &bytes[..len - back]
        } else {
            bytes
        };
    }
    bytes
}
