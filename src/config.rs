//! The read-only configuration object the simulator is constructed with.
//! Plain data, constructed programmatically or loaded from a TOML file —
//! never a global.

use crate::fcsr::RoundingMode;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SyncExceptionPolicy {
    /// Suppress synchronous exceptions silently.
    Masked,
    /// Abort the current `step()` as soon as an unmasked exception fires.
    Terminate,
    /// Finish the cycle, then surface the exception to the caller.
    Continue,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FpExceptionEnable {
    pub invalid_operation: bool,
    pub overflow: bool,
    pub underflow: bool,
    pub divide_by_zero: bool,
}

impl Default for FpExceptionEnable {
    fn default() -> FpExceptionEnable {
        FpExceptionEnable {
            invalid_operation: true,
            overflow: true,
            underflow: false,
            divide_by_zero: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Enables EX/MEM -> EX forwarding for RAW resolution.
    pub forwarding: bool,
    pub sync_exceptions: SyncExceptionPolicy,
    pub fp_exceptions: FpExceptionEnable,
    pub fp_rounding_mode: RoundingMode,
    /// Gates the classic-MIPS branch-delay-slot behavior described in the
    /// spec's open question: when set, the instruction fetched alongside a
    /// taken jump/branch is allowed to reach ID once before the flush takes
    /// effect instead of being discarded outright.
    pub branch_delay_slot: bool,
    /// Size, in bytes, of the data segment's backing store.
    pub data_memory_size: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            forwarding: true,
            sync_exceptions: SyncExceptionPolicy::Continue,
            fp_exceptions: FpExceptionEnable::default(),
            fp_rounding_mode: RoundingMode::Nearest,
            branch_delay_slot: false,
            data_memory_size: 1 << 16,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_enables_forwarding_and_continue_policy() {
        let config = Config::default();
        assert!(config.forwarding);
        assert_eq!(config.sync_exceptions, SyncExceptionPolicy::Continue);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
