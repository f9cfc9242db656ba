use std::mem;

use crate::error::{LargeBwtError, LargeBwtResult};
use crate::params::BwtParams;
use crate::string_set::SuffixCoord;

use super::buckets::BucketedSuffix;

/// Device bytes reserved per suffix of a sorting block: suffix coordinates,
/// sort indices, (key, index) pairs, active slots and the BWT symbols
pub const DEVICE_BYTES_PER_SUFFIX: u64 = 40;

const HOST_STAGING_BYTES_PER_SUFFIX: u64 = mem::size_of::<SuffixCoord>() as u64;
const HOST_BWT_BYTES_PER_SUFFIX: u64 = 1;

// keyed records, collected records, counting keys and counting runs
const HOST_BYTES_PER_SLICE_SUFFIX: u64 = (2 * mem::size_of::<BucketedSuffix>()
    + mem::size_of::<u32>()
    + mem::size_of::<(u32, u64)>()) as u64;

/// Bytes handed out to the named buffers of one memory scope. Buffers are
/// never released during a run, so the reserved total is also the peak.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    scope: &'static str,
    budget: u64,
    reserved: u64,
}

impl MemoryLedger {
    pub fn new(scope: &'static str, budget: u64) -> Self {
        Self {
            scope,
            budget,
            reserved: 0,
        }
    }

    pub fn unbounded(scope: &'static str) -> Self {
        Self::new(scope, u64::MAX)
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved
    }

    fn request(&self, buffer: &'static str, additional: u64) -> LargeBwtResult<()> {
        let requested = self.reserved.saturating_add(additional);

        if requested > self.budget {
            return Err(LargeBwtError::BudgetExceeded {
                scope: self.scope,
                buffer,
                requested,
                budget: self.budget,
            });
        }

        Ok(())
    }

    fn commit(&mut self, additional: u64) {
        self.reserved += additional;
    }
}

/// A named, reusable buffer. Its capacity only ever grows and every growth is
/// booked on a [`MemoryLedger`].
#[derive(Debug)]
pub struct ScratchBuffer<T> {
    name: &'static str,
    data: Vec<T>,
}

impl<T: Clone + Default> ScratchBuffer<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            data: Vec::new(),
        }
    }

    pub fn reserve_at_least(
        &mut self,
        len: usize,
        ledger: &mut MemoryLedger,
    ) -> LargeBwtResult<()> {
        let capacity = self.data.capacity();
        if capacity >= len {
            return Ok(());
        }

        let element_bytes = mem::size_of::<T>() as u64;
        ledger.request(self.name, (len - capacity) as u64 * element_bytes)?;

        if self.data.try_reserve_exact(len - self.data.len()).is_err() {
            let bytes = len as u64 * element_bytes;
            log::error!(
                "{} allocation of {} bytes for {} failed",
                ledger.scope,
                bytes,
                self.name
            );

            return Err(LargeBwtError::AllocationFailed {
                buffer: self.name,
                bytes,
            });
        }

        ledger.commit((self.data.capacity() - capacity) as u64 * element_bytes);

        Ok(())
    }

    /// Resizes to `len` elements, all set to the default value
    pub fn reset(&mut self, len: usize, ledger: &mut MemoryLedger) -> LargeBwtResult<&mut [T]> {
        self.reserve_at_least(len, ledger)?;
        self.data.clear();
        self.data.resize(len, T::default());
        Ok(&mut self.data)
    }

    /// Resizes to `len` elements, leaving stale content in place
    pub fn resize(&mut self, len: usize, ledger: &mut MemoryLedger) -> LargeBwtResult<&mut [T]> {
        self.reserve_at_least(len, ledger)?;
        self.data.resize(len, T::default());
        Ok(&mut self.data)
    }

    /// Empties the buffer, keeping room for `len` elements to be appended
    /// without reallocating
    pub fn cleared(
        &mut self,
        len: usize,
        ledger: &mut MemoryLedger,
    ) -> LargeBwtResult<&mut Vec<T>> {
        self.reserve_at_least(len, ledger)?;
        self.data.clear();
        Ok(&mut self.data)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Capacities derived from the memory budgets for one bucketing width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizes {
    /// Suffixes the host staging buffer can hold
    pub max_super_block_size: u64,
    /// Suffixes one device sorting block can hold
    pub max_block_size: u64,
}

impl BlockSizes {
    pub fn calculate(params: &BwtParams, bucketing_bits: u32) -> LargeBwtResult<Self> {
        let max_block_size = (params.device_memory / DEVICE_BYTES_PER_SUFFIX).min(u32::MAX as u64);

        if max_block_size == 0 {
            return Err(LargeBwtError::InvalidParams(format!(
                "device memory budget of {} bytes cannot hold a single suffix",
                params.device_memory
            )));
        }

        let host_overhead = host_table_bytes(params, bucketing_bits)
            + max_block_size * HOST_BWT_BYTES_PER_SUFFIX;
        let max_super_block_size =
            params.host_memory.saturating_sub(host_overhead) / HOST_STAGING_BYTES_PER_SUFFIX;

        if max_super_block_size == 0 {
            return Err(LargeBwtError::InvalidParams(format!(
                "host memory budget of {} bytes leaves no room for staging at {} bits \
                 (needs more than {})",
                params.host_memory, bucketing_bits, host_overhead
            )));
        }

        Ok(Self {
            max_super_block_size,
            max_block_size,
        })
    }

    /// Block sizes of the leading bucketing widths that leave room for
    /// staging. Tables grow with the width, so no later width fits either.
    /// Fails only if the first width does not fit.
    pub fn for_widths(params: &BwtParams) -> LargeBwtResult<Vec<(u32, Self)>> {
        let mut widths = Vec::with_capacity(params.bucketing_bits.len());

        for &bits in &params.bucketing_bits {
            match Self::calculate(params, bits) {
                Ok(sizes) => widths.push((bits, sizes)),
                Err(error) if widths.is_empty() => return Err(error),
                Err(_) => break,
            }
        }

        Ok(widths)
    }
}

// everything the host keeps besides the staging buffer and the block BWT copy
fn host_table_bytes(params: &BwtParams, bucketing_bits: u32) -> u64 {
    let bucket_tables = 2 * mem::size_of::<u64>() as u64 * (1u64 << bucketing_bits);
    let chunk_offsets = (params.chunk_strings as u64 + 1) * mem::size_of::<u64>() as u64;
    let slices = params.slice_suffixes as u64 * HOST_BYTES_PER_SLICE_SUFFIX;

    bucket_tables + chunk_offsets + slices
}
