use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LimitError {
    #[error("wall clock timeout must be greater than zero")]
    ZeroTimeout,
    #[error("output limit must be greater than zero")]
    ZeroOutput,
    #[error("network access cannot be granted to submissions")]
    NetworkForbidden,
}

const MIB: u64 = 1024 * 1024;

/// Resource bounds of one execution
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionLimits {
    pub wall_clock_timeout_ms: u64,
    /// cap applied to stdout and stderr separately
    pub max_output_bytes: u64,
    /// address space limit, zero disables it
    pub max_memory_bytes: u64,
    pub allow_network: bool,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            wall_clock_timeout_ms: 5 * 1000,
            max_output_bytes: 64 * 1024,
            max_memory_bytes: 256 * MIB,
            allow_network: false,
        }
    }
}

impl ExecutionLimits {
    pub fn validate(&self) -> Result<(), LimitError> {
        if self.wall_clock_timeout_ms == 0 {
            return Err(LimitError::ZeroTimeout);
        }
        if self.max_output_bytes == 0 {
            return Err(LimitError::ZeroOutput);
        }
        if self.allow_network {
            return Err(LimitError::NetworkForbidden);
        }
        Ok(())
    }
    pub fn wall_clock(&self) -> Duration {
        Duration::from_millis(self.wall_clock_timeout_ms)
    }
    /// CPU seconds granted to the process, one second above the wall clock
    ///
    /// The watchdog fires first for every program that is not multi-threaded.
    pub fn cpu_seconds(&self) -> u64 {
        self.wall_clock_timeout_ms.div_ceil(1000) + 1
    }
    /// memory limit in MiB rounded up, `None` when unlimited
    pub fn memory_mib(&self) -> Option<u64> {
        (self.max_memory_bytes != 0).then(|| self.max_memory_bytes.div_ceil(MIB))
    }
    pub fn output_limit(&self) -> usize {
        usize::try_from(self.max_output_bytes).unwrap_or(usize::MAX)
    }
    /// Return a copy with every field set in `o` replaced
    pub fn apply(&self, o: &LimitOverride) -> Self {
        Self {
            wall_clock_timeout_ms: o.wall_clock_timeout_ms.unwrap_or(self.wall_clock_timeout_ms),
            max_output_bytes: o.max_output_bytes.unwrap_or(self.max_output_bytes),
            max_memory_bytes: o.max_memory_bytes.unwrap_or(self.max_memory_bytes),
            allow_network: self.allow_network,
        }
    }
}

/// Partial limits merged over the configured defaults
#[derive(Debug, Clone, Default, derive_builder::Builder)]
#[builder(pattern = "owned", default, setter(strip_option))]
pub struct LimitOverride {
    wall_clock_timeout_ms: Option<u64>,
    max_output_bytes: Option<u64>,
    max_memory_bytes: Option<u64>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ExecutionLimits::default().validate(), Ok(()));
    }

    #[test]
    fn reject_invalid() {
        let limits = ExecutionLimits {
            wall_clock_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(limits.validate(), Err(LimitError::ZeroTimeout));
        let limits = ExecutionLimits {
            max_output_bytes: 0,
            ..Default::default()
        };
        assert_eq!(limits.validate(), Err(LimitError::ZeroOutput));
        let limits = ExecutionLimits {
            allow_network: true,
            ..Default::default()
        };
        assert_eq!(limits.validate(), Err(LimitError::NetworkForbidden));
    }

    #[test]
    fn derived_values() {
        let limits = ExecutionLimits {
            wall_clock_timeout_ms: 1500,
            max_memory_bytes: MIB + 1,
            ..Default::default()
        };
        assert_eq!(limits.cpu_seconds(), 3);
        assert_eq!(limits.memory_mib(), Some(2));
        assert_eq!(limits.wall_clock(), Duration::from_millis(1500));
        let unlimited = ExecutionLimits {
            max_memory_bytes: 0,
            ..Default::default()
        };
        assert_eq!(unlimited.memory_mib(), None);
    }

    #[test]
    fn override_only_given_fields() {
        let base = ExecutionLimits::default();
        let o = LimitOverrideBuilder::default()
            .wall_clock_timeout_ms(1000)
            .build()
            .unwrap();
        let merged = base.apply(&o);
        assert_eq!(merged.wall_clock_timeout_ms, 1000);
        assert_eq!(merged.max_output_bytes, base.max_output_bytes);
        assert_eq!(merged.max_memory_bytes, base.max_memory_bytes);
        assert_eq!(base.apply(&LimitOverride::default()), base);
    }
}
