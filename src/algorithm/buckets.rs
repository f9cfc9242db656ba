use std::ops::Range;

use crate::error::LargeBwtResult;
use crate::primitives::{Backend, ExecutionContext};
use crate::string_set::{StringSet, SuffixCoord};

use super::buffer_management::{MemoryLedger, ScratchBuffer};
use super::radices;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketedSuffix {
    pub coord: SuffixCoord,
    pub bucket: u32,
}

/// What a collection pass over one chunk found in the requested bucket range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub num_collected: u64,
    pub max_suffix_len: u32,
}

/// A run of consecutive strings whose non-empty suffixes are enumerated by a
/// flat index, `suffix_starts` being the exclusive prefix sum of the lengths
pub struct SuffixChunk<'b> {
    strings: Range<u32>,
    suffix_starts: &'b [u64],
    num_suffixes: u64,
}

impl SuffixChunk<'_> {
    #[inline]
    fn coord(&self, flat_index: u64) -> SuffixCoord {
        // the last string starting at or before the index, which skips empty strings
        let local = self
            .suffix_starts
            .partition_point(|&start| start <= flat_index)
            - 1;

        SuffixCoord {
            string_id: self.strings.start + local as u32,
            offset: (flat_index - self.suffix_starts[local]) as u32,
        }
    }
}

/// Computes the flat suffix enumeration of the strings in `strings`
fn load_chunk<'b, B: Backend, S: StringSet>(
    backend: &B,
    string_set: &S,
    strings: Range<u32>,
    suffix_starts: &'b mut ScratchBuffer<u64>,
    ledger: &mut MemoryLedger,
) -> LargeBwtResult<SuffixChunk<'b>> {
    let first = strings.start;
    let starts = suffix_starts.resize((strings.end - strings.start) as usize, ledger)?;

    backend.transform(starts, |i| string_set.string_len(first + i as u32) as u64);
    let num_suffixes = backend.exclusive_scan(starts, 0, |a, b| a + b);

    Ok(SuffixChunk {
        strings,
        suffix_starts: suffix_starts.as_slice(),
        num_suffixes,
    })
}

/// Splits a string set into chunks of at most `chunk_strings` strings
pub fn chunk_ranges(num_strings: u32, chunk_strings: u32) -> impl Iterator<Item = Range<u32>> {
    (0..num_strings)
        .step_by(chunk_strings as usize)
        .map(move |begin| begin..begin.saturating_add(chunk_strings).min(num_strings))
}

/// Assigns suffixes to radix buckets, either counting bucket sizes or
/// collecting the suffixes of a bucket range
pub struct SuffixBucketer<'c, B: Backend> {
    ctx: &'c ExecutionContext<B>,
    bucketing_bits: u32,
    symbol_bits: u32,
    slice_suffixes: u64,
    suffix_starts: ScratchBuffer<u64>,
    keys: ScratchBuffer<u32>,
    runs: ScratchBuffer<(u32, u64)>,
    records: ScratchBuffer<BucketedSuffix>,
    collected: ScratchBuffer<BucketedSuffix>,
}

impl<'c, B: Backend> SuffixBucketer<'c, B> {
    pub fn new(ctx: &'c ExecutionContext<B>, symbol_bits: u32, slice_suffixes: u32) -> Self {
        Self {
            ctx,
            bucketing_bits: 0,
            symbol_bits,
            slice_suffixes: slice_suffixes as u64,
            suffix_starts: ScratchBuffer::new("chunk suffix starts"),
            keys: ScratchBuffer::new("slice keys"),
            runs: ScratchBuffer::new("slice runs"),
            records: ScratchBuffer::new("slice records"),
            collected: ScratchBuffer::new("collected records"),
        }
    }

    pub fn set_bucketing_bits(&mut self, bucketing_bits: u32) {
        self.bucketing_bits = bucketing_bits;
    }

    pub fn num_buckets(&self) -> usize {
        1 << self.bucketing_bits
    }

    /// Adds the bucket sizes of all suffixes of the chunk to `counts`
    pub fn count<S: StringSet>(
        &mut self,
        string_set: &S,
        strings: Range<u32>,
        counts: &mut [u64],
        ledger: &mut MemoryLedger,
    ) -> LargeBwtResult<u64> {
        let (bucketing_bits, symbol_bits, slice_suffixes) =
            (self.bucketing_bits, self.symbol_bits, self.slice_suffixes);
        let ctx = self.ctx;
        let backend = ctx.backend();

        let chunk = load_chunk(backend, string_set, strings, &mut self.suffix_starts, ledger)?;

        let mut slice_begin = 0;
        while slice_begin < chunk.num_suffixes {
            let slice_len = slice_suffixes.min(chunk.num_suffixes - slice_begin) as usize;

            let keys = self.keys.resize(slice_len, ledger)?;
            backend.transform(keys, |i| {
                radices::bucket_key(
                    string_set,
                    chunk.coord(slice_begin + i as u64),
                    bucketing_bits,
                    symbol_bits,
                )
            });
            backend.sort_unstable(keys);

            let runs = self.runs.cleared(slice_len, ledger)?;
            backend.run_length_encode(self.keys.as_slice(), runs);

            for &(bucket, count) in self.runs.as_slice() {
                counts[bucket as usize] += count;
            }

            slice_begin += slice_len as u64;
        }

        Ok(chunk.num_suffixes)
    }

    /// Hands every suffix of the chunk whose bucket lies in `buckets` to
    /// `sink`, one slice at a time and in flat index order
    pub fn collect<S, F>(
        &mut self,
        string_set: &S,
        strings: Range<u32>,
        buckets: Range<u32>,
        ledger: &mut MemoryLedger,
        mut sink: F,
    ) -> LargeBwtResult<CollectSummary>
    where
        S: StringSet,
        F: FnMut(&[BucketedSuffix]) -> LargeBwtResult<()>,
    {
        let (bucketing_bits, symbol_bits, slice_suffixes) =
            (self.bucketing_bits, self.symbol_bits, self.slice_suffixes);
        let ctx = self.ctx;
        let backend = ctx.backend();

        let chunk = load_chunk(backend, string_set, strings, &mut self.suffix_starts, ledger)?;

        let mut summary = CollectSummary::default();
        let mut slice_begin = 0;

        while slice_begin < chunk.num_suffixes {
            let slice_len = slice_suffixes.min(chunk.num_suffixes - slice_begin) as usize;

            let records = self.records.resize(slice_len, ledger)?;
            backend.transform(records, |i| {
                let coord = chunk.coord(slice_begin + i as u64);
                BucketedSuffix {
                    coord,
                    bucket: radices::bucket_key(string_set, coord, bucketing_bits, symbol_bits),
                }
            });

            let collected = self.collected.cleared(slice_len, ledger)?;
            let num_collected = backend.copy_if(self.records.as_slice(), collected, |record| {
                buckets.contains(&record.bucket)
            });

            if num_collected > 0 {
                let collected = self.collected.as_slice();
                let max_suffix_len = backend.transform_reduce(
                    0..collected.len(),
                    0u32,
                    |i| {
                        let coord = collected[i].coord;
                        string_set.string_len(coord.string_id) - coord.offset
                    },
                    u32::max,
                );

                summary.num_collected += num_collected as u64;
                summary.max_suffix_len = summary.max_suffix_len.max(max_suffix_len);

                sink(collected)?;
            }

            slice_begin += slice_len as u64;
        }

        Ok(summary)
    }
}
