//! Difference cover sample used to finish the ordering of suffixes that share
//! a long common prefix

use std::cmp::Ordering;
use std::ops::Range;

use bitvec::prelude::*;

use crate::error::{LargeBwtError, LargeBwtResult};
use crate::primitives::{Backend, ExecutionContext};
use crate::string_set::{StringSet, SuffixCoord};

use super::buffer_management::MemoryLedger;
use super::compression_sort::{CompressionSort, GroupDelayList};
use super::radices;

/// A set `D` of residues modulo `period` such that for every pair `(i, j)`
/// there is an `l < period` with both `i + l` and `j + l` in `D`
#[derive(Debug, Clone)]
pub struct DifferenceCover {
    period: u32,
    in_cover: BitVec,
    positions: Vec<u32>,
    position_index: Vec<u32>,
    // per difference d, a member a of the cover with a + d also a member
    base: Vec<u32>,
}

impl DifferenceCover {
    pub fn new(period: u32) -> Self {
        assert!(period.is_power_of_two(), "period must be a power of two");

        let step = (period as f64).sqrt().ceil() as u32;
        let mut in_cover = bitvec![0; period as usize];

        for residue in 0..step.min(period) {
            in_cover.set(residue as usize, true);
        }
        for k in 0..=step {
            in_cover.set(((k * step) % period) as usize, true);
        }

        let positions: Vec<u32> = in_cover.iter_ones().map(|residue| residue as u32).collect();

        let mut position_index = vec![0; period as usize];
        for (index, &residue) in positions.iter().enumerate() {
            position_index[residue as usize] = index as u32;
        }

        let base = (0..period)
            .map(|difference| {
                positions
                    .iter()
                    .copied()
                    .find(|&a| in_cover[((a + difference) % period) as usize])
                    .unwrap_or(0)
            })
            .collect();

        Self {
            period,
            in_cover,
            positions,
            position_index,
            base,
        }
    }

    pub fn size(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn contains(&self, residue: u32) -> bool {
        self.in_cover[(residue % self.period) as usize]
    }

    /// The shift `l < period` that moves both `i` and `j` into the cover
    #[inline]
    pub fn offset(&self, i: u32, j: u32) -> u32 {
        let p = self.period;
        let difference = (j % p + p - i % p) % p;

        (self.base[difference as usize] + p - i % p) % p
    }

    /// Number of cover members among the first `len` positions
    fn count_below(&self, len: u64) -> u64 {
        let full_periods = len / self.period as u64;
        let rest = (len % self.period as u64) as u32;

        full_periods * self.size() as u64
            + self.positions.partition_point(|&residue| residue < rest) as u64
    }
}

/// Ranks of all sampled suffixes, the suffixes starting at a cover position.
///
/// Ranks are a total order consistent with suffix order: an empty suffix is
/// ranked by its string id, a non-empty one at `num_strings` plus its slot in
/// the sorted sample.
#[derive(Debug)]
pub struct Dcs {
    cover: DifferenceCover,
    num_strings: u32,
    sample_starts: Vec<u64>,
    ranks: Vec<u32>,
}

impl Dcs {
    pub fn build<B: Backend, S: StringSet>(
        ctx: &ExecutionContext<B>,
        string_set: &S,
        period: u32,
    ) -> LargeBwtResult<Self> {
        let backend = ctx.backend();
        let cover = DifferenceCover::new(period);
        let num_strings = string_set.num_strings();
        let symbol_bits = string_set.symbol_bits();

        let mut sample_starts = vec![0u64; num_strings as usize + 1];
        backend.transform(&mut sample_starts[..num_strings as usize], |string_id| {
            cover.count_below(string_set.string_len(string_id as u32) as u64)
        });
        let num_samples = backend.exclusive_scan(&mut sample_starts, 0, |a, b| a + b);

        if num_strings as u64 + num_samples >= u32::MAX as u64 {
            return Err(LargeBwtError::InvalidInput(format!(
                "{} strings with {} sampled suffixes exceed the rank range",
                num_strings, num_samples
            )));
        }

        let num_samples = num_samples as usize;
        let sample_size = cover.size() as u64;

        let mut samples = vec![SuffixCoord::default(); num_samples];
        backend.transform(&mut samples, |sample| {
            let sample = sample as u64;
            let string_id = sample_starts.partition_point(|&start| start <= sample) - 1;
            let local = sample - sample_starts[string_id];

            SuffixCoord {
                string_id: string_id as u32,
                offset: ((local / sample_size) * period as u64
                    + cover.positions[(local % sample_size) as usize] as u64)
                    as u32,
            }
        });

        let mut dcs = Self {
            cover,
            num_strings,
            sample_starts,
            ranks: vec![0; num_samples],
        };

        // the order of the first `period` symbols
        let mut ledger = MemoryLedger::unbounded("dcs");
        let mut sorter = CompressionSort::new(ctx);
        let mut indices = vec![0u32; num_samples];
        let mut delay_list = GroupDelayList::default();

        sorter.sort(
            radices::words_for_len(period, symbol_bits),
            |sample, word| {
                radices::suffix_word(string_set, samples[sample as usize], word, symbol_bits)
            },
            &mut indices,
            &mut delay_list,
            &mut ledger,
        )?;

        for (slot, &sample) in indices.iter().enumerate() {
            dcs.ranks[sample as usize] = num_strings + slot as u32;
        }
        for group in delay_list.groups() {
            for slot in group.clone() {
                dcs.ranks[indices[slot] as usize] = num_strings + group.start as u32;
            }
        }

        let mut groups = delay_list.groups().to_vec();
        let mut step = period as u64;
        let mut num_rounds = 0;

        while !groups.is_empty() {
            groups = dcs.refine(backend, string_set, &samples, &mut indices, &groups, step);
            step *= 2;
            num_rounds += 1;
        }

        log::debug!(
            "sorted {} sampled suffixes with period {} in {} doubling rounds",
            num_samples,
            period,
            num_rounds
        );

        Ok(dcs)
    }

    // one prefix doubling round over the unresolved groups, returns the groups
    // that are still tied
    fn refine<B: Backend, S: StringSet>(
        &mut self,
        backend: &B,
        string_set: &S,
        samples: &[SuffixCoord],
        indices: &mut [u32],
        groups: &[Range<usize>],
        step: u64,
    ) -> Vec<Range<usize>> {
        let mut slots = Vec::new();
        let mut active = Vec::new();

        for group in groups {
            for slot in group.clone() {
                slots.push(slot as u32);
                active.push(((group.start as u64) << 32, indices[slot]));
            }
        }

        // every key is computed from the ranks of the previous round
        let this = &*self;
        backend.for_each_mut(&mut active, |_, pair| {
            let coord = samples[pair.1 as usize];
            let successor = coord.offset as u64 + step;
            pair.0 |= this.rank_at(string_set, coord.string_id, successor) as u64;
        });
        backend.sort_by_key(&mut active, |pair| pair.0);

        let mut tied = Vec::new();
        let mut k = 0;

        while k < active.len() {
            let key = active[k].0;
            let head = slots[k];
            let mut end = k;

            while end < active.len() && active[end].0 == key {
                indices[slots[end] as usize] = active[end].1;
                self.ranks[active[end].1 as usize] = self.num_strings + head;
                end += 1;
            }

            if end - k > 1 {
                tied.push(head as usize..slots[end - 1] as usize + 1);
            }
            k = end;
        }

        tied
    }

    pub fn num_samples(&self) -> usize {
        self.ranks.len()
    }

    fn sample_index(&self, string_id: u32, offset: u64) -> usize {
        let period = self.cover.period as u64;

        (self.sample_starts[string_id as usize]
            + (offset / period) * self.cover.size() as u64
            + self.cover.position_index[(offset % period) as usize] as u64) as usize
    }

    // `offset` must be a cover position or lie past the end of the string
    #[inline]
    fn rank_at<S: StringSet>(&self, string_set: &S, string_id: u32, offset: u64) -> u32 {
        if offset >= string_set.string_len(string_id) as u64 {
            string_id
        } else {
            debug_assert!(self.cover.contains((offset % self.cover.period as u64) as u32));
            self.ranks[self.sample_index(string_id, offset)]
        }
    }

    /// Orders two suffixes that agree on their first `period` symbols, or that
    /// are equal altogether
    pub fn compare<S: StringSet>(
        &self,
        string_set: &S,
        a: SuffixCoord,
        b: SuffixCoord,
    ) -> Ordering {
        let shift = self.cover.offset(a.offset, b.offset) as u64;

        self.rank_at(string_set, a.string_id, a.offset as u64 + shift)
            .cmp(&self.rank_at(string_set, b.string_id, b.offset as u64 + shift))
            .then_with(|| a.cmp(&b))
    }
}
