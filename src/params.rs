//! Configuration of a BWT construction run
//!
//! The memory budgets are hard caps: the planner sizes every staging buffer
//! from them and refuses to go beyond.

use serde::{Deserialize, Serialize};

use crate::algorithm::radices::{DOLLAR_BITS, DOLLAR_MASK};
use crate::error::{LargeBwtError, LargeBwtResult};
use crate::packed::{MAX_SYMBOL_BITS, MIN_SYMBOL_BITS};

const GIB: u64 = 1024 * 1024 * 1024;

/// Widest bucket key that is still allowed, the bucket tables grow as 2^bits
pub const MAX_BUCKETING_BITS: u32 = 28;

pub const MIN_DCS_PERIOD: u32 = 8;
pub const MAX_DCS_PERIOD: u32 = 4096;

/// Which implementation of the bulk primitives a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sequential,
    #[default]
    Parallel,
}

/// Parameters of a large BWT construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BwtParams {
    /// Host memory budget in bytes (default: 8GiB)
    pub host_memory: u64,
    /// Device (sorting scratch) memory budget in bytes (default: 2GiB)
    pub device_memory: u64,
    /// Bucket key widths, tried in order until no bucket is too large
    pub bucketing_bits: Vec<u32>,
    /// Period of the difference cover used for long ties (default: 256)
    pub dcs_period: u32,
    /// Number of strings loaded per chunk (default: 128K)
    pub chunk_strings: u32,
    /// Number of suffixes keyed per bulk bucketing call (default: 1M)
    pub slice_suffixes: u32,
    pub backend: BackendKind,
    /// Worker threads of the parallel backend, the global rayon pool if unset
    pub num_threads: Option<usize>,
}

impl Default for BwtParams {
    fn default() -> Self {
        Self {
            host_memory: 8 * GIB,
            device_memory: 2 * GIB,
            bucketing_bits: vec![16, 20, 24],
            dcs_period: 256,
            chunk_strings: 128 * 1024,
            slice_suffixes: 1024 * 1024,
            backend: BackendKind::Parallel,
            num_threads: None,
        }
    }
}

impl BwtParams {
    pub fn validate(&self, symbol_bits: u32) -> LargeBwtResult<()> {
        if !(MIN_SYMBOL_BITS..=MAX_SYMBOL_BITS).contains(&symbol_bits) {
            return Err(invalid(format!(
                "symbol width {} is outside [{}, {}]",
                symbol_bits, MIN_SYMBOL_BITS, MAX_SYMBOL_BITS
            )));
        }

        if self.host_memory == 0 || self.device_memory == 0 {
            return Err(invalid("memory budgets must be non-zero"));
        }

        if self.bucketing_bits.is_empty() {
            return Err(invalid("at least one bucketing width is required"));
        }

        if self.bucketing_bits.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid("bucketing widths must be strictly increasing"));
        }

        for &bits in &self.bucketing_bits {
            if bits < DOLLAR_BITS + symbol_bits || bits > MAX_BUCKETING_BITS {
                return Err(invalid(format!(
                    "bucketing width {} is outside [{}, {}] for {}-bit symbols",
                    bits,
                    DOLLAR_BITS + symbol_bits,
                    MAX_BUCKETING_BITS,
                    symbol_bits
                )));
            }

            // the dollar field has to be able to count every prefix symbol
            if (bits - DOLLAR_BITS) / symbol_bits > DOLLAR_MASK {
                return Err(invalid(format!(
                    "bucketing width {} holds too many {}-bit symbols",
                    bits, symbol_bits
                )));
            }
        }

        if !self.dcs_period.is_power_of_two()
            || !(MIN_DCS_PERIOD..=MAX_DCS_PERIOD).contains(&self.dcs_period)
        {
            return Err(invalid(format!(
                "dcs period {} must be a power of two in [{}, {}]",
                self.dcs_period, MIN_DCS_PERIOD, MAX_DCS_PERIOD
            )));
        }

        if self.chunk_strings == 0 || self.slice_suffixes == 0 {
            return Err(invalid("chunk and slice sizes must be non-zero"));
        }

        if self.num_threads == Some(0) {
            return Err(invalid("num_threads must be non-zero when set"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> LargeBwtError {
    LargeBwtError::InvalidParams(msg.into())
}
