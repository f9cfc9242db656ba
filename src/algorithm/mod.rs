pub mod buckets;
pub mod buffer_management;
pub mod compression_sort;
pub mod dcs;
pub mod planning;
pub(crate) mod radices;

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{LargeBwtError, LargeBwtResult};
use crate::handlers::{BwtBatch, BwtHandler};
use crate::params::BwtParams;
use crate::primitives::{Backend, ExecutionContext};
use crate::string_set::{StringSet, SuffixCoord};

use buckets::{SuffixBucketer, chunk_ranges};
use buffer_management::{BlockSizes, DEVICE_BYTES_PER_SUFFIX, MemoryLedger, ScratchBuffer};
use compression_sort::{CompressionSort, DiscardDelayList, GroupDelayList};
use dcs::Dcs;
use planning::{PlanOutcome, SubBucket, SuperBlock};

/// Outcome of one pass at a fixed bucketing width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeBwtStatus {
    Ok,
    /// A bucket that cannot be split is larger than a sorting block
    LargeBucket { bucket_index: u32, bucket_size: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LargeBwtStats {
    /// Width of the bucket keys of the successful pass
    pub bucketing_bits: u32,
    /// Output positions, terminators included
    pub num_suffixes: u64,
    pub num_super_blocks: usize,
    pub num_sub_buckets: usize,
    pub num_oversized_buckets: usize,
    pub num_delayed_groups: usize,
    pub num_dcs_samples: usize,
    pub peak_host_bytes: u64,
    pub peak_device_bytes: u64,
    pub counting_time: Duration,
    pub planning_time: Duration,
    pub collecting_time: Duration,
    pub sorting_time: Duration,
    pub total_time: Duration,
}

/// State of one BWT construction: the string set, the difference cover and
/// every buffer, which are reused across passes, super-blocks and sub-buckets
pub struct LargeBwtSkeleton<'c, 's, B: Backend, S: StringSet> {
    ctx: &'c ExecutionContext<B>,
    string_set: &'s S,
    params: &'c BwtParams,
    // the leading bucketing widths whose tables fit the host budget
    widths: Vec<(u32, BlockSizes)>,
    symbol_bits: u32,
    dcs: Option<Dcs>,
    dcs_words: u32,

    bucketer: SuffixBucketer<'c, B>,
    sorter: CompressionSort<'c, B>,
    delay_list: GroupDelayList,

    host_ledger: MemoryLedger,
    bucket_counts: ScratchBuffer<u64>,
    bucket_offsets: ScratchBuffer<u64>,
    staging: ScratchBuffer<SuffixCoord>,
    host_bwt: ScratchBuffer<u8>,

    device_ledger: MemoryLedger,
    device_suffixes: ScratchBuffer<SuffixCoord>,
    device_indices: ScratchBuffer<u32>,
    device_bwt: ScratchBuffer<u8>,

    stats: LargeBwtStats,
}

impl<'c, 's, B: Backend, S: StringSet> LargeBwtSkeleton<'c, 's, B, S> {
    /// Expects validated parameters
    pub fn new(
        ctx: &'c ExecutionContext<B>,
        string_set: &'s S,
        params: &'c BwtParams,
    ) -> LargeBwtResult<Self> {
        let widths = BlockSizes::for_widths(params)?;
        if widths.len() < params.bucketing_bits.len() {
            log::info!(
                "skipping bucketing widths {:?}, their bucket tables exceed the host budget",
                &params.bucketing_bits[widths.len()..]
            );
        }

        let symbol_bits = string_set.symbol_bits();
        let dcs_words = radices::words_for_len(params.dcs_period, symbol_bits);
        let word_reach = dcs_words * radices::symbols_per_word(symbol_bits);

        // below the reach of the sort words, every tie is an exact duplicate
        let dcs = if string_set.max_string_len() > word_reach {
            Some(Dcs::build(ctx, string_set, params.dcs_period)?)
        } else {
            None
        };

        let stats = LargeBwtStats {
            num_dcs_samples: dcs.as_ref().map_or(0, Dcs::num_samples),
            ..LargeBwtStats::default()
        };

        Ok(Self {
            ctx,
            string_set,
            params,
            widths,
            symbol_bits,
            dcs,
            dcs_words,
            bucketer: SuffixBucketer::new(ctx, symbol_bits, params.slice_suffixes),
            sorter: CompressionSort::new(ctx),
            delay_list: GroupDelayList::default(),
            host_ledger: MemoryLedger::new("host", params.host_memory),
            bucket_counts: ScratchBuffer::new("bucket counts"),
            bucket_offsets: ScratchBuffer::new("bucket offsets"),
            staging: ScratchBuffer::new("host suffixes"),
            host_bwt: ScratchBuffer::new("host bwt"),
            device_ledger: MemoryLedger::new("device", params.device_memory),
            device_suffixes: ScratchBuffer::new("device suffixes"),
            device_indices: ScratchBuffer::new("device indices"),
            device_bwt: ScratchBuffer::new("device bwt"),
            stats,
        })
    }

    /// The bucketing widths worth a pass, in the order they are tried
    pub fn bucketing_widths(&self) -> Vec<u32> {
        self.widths.iter().map(|&(bits, _)| bits).collect()
    }

    pub fn into_stats(mut self) -> LargeBwtStats {
        self.stats.peak_host_bytes = self.host_ledger.reserved_bytes();
        self.stats.peak_device_bytes = self.device_ledger.reserved_bytes();
        self.stats
    }

    /// Emits the positions of the string terminators, which come first in
    /// string id order
    pub fn emit_dollar_batch<H: BwtHandler>(&mut self, handler: &mut H) -> LargeBwtResult<()> {
        let num_strings = self.string_set.num_strings();
        if num_strings == 0 {
            return Ok(());
        }

        // the buffers stay reserved, so they have to fit the staging room of
        // every width a later pass may use
        let batch_size = self
            .widths
            .iter()
            .map(|(_, sizes)| sizes.max_block_size.min(sizes.max_super_block_size))
            .min()
            .unwrap_or(1)
            .min(num_strings as u64) as u32;

        let ctx = self.ctx;
        let backend = ctx.backend();
        let string_set = self.string_set;

        log::debug!("emitting {} terminators", num_strings);

        let mut begin = 0;
        while begin < num_strings {
            let len = batch_size.min(num_strings - begin) as usize;

            let host_suffixes = self.staging.resize(len, &mut self.host_ledger)?;
            backend.transform(host_suffixes, |i| {
                let string_id = begin + i as u32;
                SuffixCoord::new(string_id, string_set.string_len(string_id))
            });

            let device_suffixes = self.device_suffixes.resize(len, &mut self.device_ledger)?;
            device_suffixes.copy_from_slice(self.staging.as_slice());

            let device_bwt = self.device_bwt.resize(len, &mut self.device_ledger)?;
            backend.transform(device_bwt, |i| {
                let coord = device_suffixes[i];
                match coord.offset {
                    0 => radices::DOLLAR_SYMBOL,
                    string_len => string_set.symbol(coord.string_id, string_len - 1),
                }
            });

            let host_bwt = self.host_bwt.resize(len, &mut self.host_ledger)?;
            host_bwt.copy_from_slice(self.device_bwt.as_slice());

            handler.process(&BwtBatch {
                host_bwt: self.host_bwt.as_slice(),
                device_bwt: self.device_bwt.as_slice(),
                host_suffixes: self.staging.as_slice(),
                device_suffixes: self.device_suffixes.as_slice(),
                device_indices: None,
            })?;

            begin += len as u32;
        }

        self.stats.num_suffixes += num_strings as u64;
        Ok(())
    }

    /// Sorts and emits all non-empty suffixes using bucket keys of
    /// `bucketing_bits` bits. Counting always starts from scratch, nothing is
    /// emitted if a bucket turns out too large.
    pub fn enact<H: BwtHandler>(
        &mut self,
        bucketing_bits: u32,
        handler: &mut H,
    ) -> LargeBwtResult<LargeBwtStatus> {
        let sizes = BlockSizes::calculate(self.params, bucketing_bits)?;
        let ctx = self.ctx;
        let backend = ctx.backend();
        let string_set = self.string_set;
        let num_strings = string_set.num_strings();

        self.bucketer.set_bucketing_bits(bucketing_bits);
        let num_buckets = self.bucketer.num_buckets();

        log::debug!(
            "counting suffixes into {} buckets (super-blocks of {}, blocks of {} suffixes)",
            num_buckets,
            sizes.max_super_block_size,
            sizes.max_block_size
        );

        let start = Instant::now();
        let counts = self.bucket_counts.reset(num_buckets, &mut self.host_ledger)?;
        let mut num_suffixes = 0;

        for strings in chunk_ranges(num_strings, self.params.chunk_strings) {
            num_suffixes += self
                .bucketer
                .count(string_set, strings, counts, &mut self.host_ledger)?;
        }
        self.stats.counting_time += start.elapsed();

        let start = Instant::now();
        let plan = match planning::plan_buckets(self.bucket_counts.as_slice(), sizes)? {
            PlanOutcome::Planned(plan) => plan,
            PlanOutcome::LargeBucket {
                bucket_index,
                bucket_size,
            } => {
                return Ok(LargeBwtStatus::LargeBucket {
                    bucket_index,
                    bucket_size,
                });
            }
        };

        let offsets = self.bucket_offsets.resize(num_buckets, &mut self.host_ledger)?;
        offsets.copy_from_slice(self.bucket_counts.as_slice());
        backend.exclusive_scan(offsets, 0, |a, b| a + b);

        let largest_block = plan
            .super_blocks
            .iter()
            .flat_map(|super_block| &super_block.sub_buckets)
            .map(|sub_bucket| sub_bucket.num_suffixes().min(sizes.max_block_size))
            .max()
            .unwrap_or(0) as usize;

        self.staging
            .reserve_at_least(plan.largest_super_block as usize, &mut self.host_ledger)?;
        self.host_bwt.reserve_at_least(largest_block, &mut self.host_ledger)?;
        self.device_suffixes
            .reserve_at_least(largest_block, &mut self.device_ledger)?;
        self.device_indices
            .reserve_at_least(largest_block, &mut self.device_ledger)?;
        self.device_bwt.reserve_at_least(largest_block, &mut self.device_ledger)?;
        self.sorter.reserve(
            plan.largest_merged_sub_bucket as usize,
            &mut self.device_ledger,
        )?;
        self.stats.planning_time += start.elapsed();

        log::debug!(
            "planned {} suffixes into {} super-blocks and {} sub-buckets ({} oversized)",
            num_suffixes,
            plan.super_blocks.len(),
            plan.num_sub_buckets(),
            plan.num_oversized_buckets()
        );

        for super_block in &plan.super_blocks {
            self.collect_super_block(super_block)?;

            let mut position = 0;
            for sub_bucket in &super_block.sub_buckets {
                let len = sub_bucket.num_suffixes() as usize;

                match sub_bucket {
                    SubBucket::Merged { .. } => {
                        self.sort_sub_bucket(position..position + len, handler)?
                    }
                    SubBucket::Oversized { .. } => self.emit_oversized_bucket(
                        position..position + len,
                        sizes.max_block_size as usize,
                        handler,
                    )?,
                }

                position += len;
            }
        }

        self.stats.bucketing_bits = bucketing_bits;
        self.stats.num_suffixes += num_suffixes;
        self.stats.num_super_blocks = plan.super_blocks.len();
        self.stats.num_sub_buckets = plan.num_sub_buckets();
        self.stats.num_oversized_buckets = plan.num_oversized_buckets();

        Ok(LargeBwtStatus::Ok)
    }

    // gathers the suffixes of the super-block into the staging buffer, each at
    // its slot behind the suffixes of the preceding buckets
    fn collect_super_block(&mut self, super_block: &SuperBlock) -> LargeBwtResult<()> {
        let start = Instant::now();
        let string_set = self.string_set;
        let len = super_block.num_suffixes as usize;
        let suffix_offset = super_block.suffix_offset;

        self.staging.resize(len, &mut self.host_ledger)?;

        let mut num_collected = 0;
        let mut max_suffix_len = 0;

        for strings in chunk_ranges(string_set.num_strings(), self.params.chunk_strings) {
            let offsets = self.bucket_offsets.as_mut_slice();
            let staging = self.staging.as_mut_slice();

            let summary = self.bucketer.collect(
                string_set,
                strings,
                super_block.buckets.clone(),
                &mut self.host_ledger,
                |records| {
                    for record in records {
                        let offset = &mut offsets[record.bucket as usize];
                        let slot = offset.wrapping_sub(suffix_offset) as usize;

                        if slot >= staging.len() {
                            return Err(inconsistent_input());
                        }

                        staging[slot] = record.coord;
                        *offset += 1;
                    }

                    Ok(())
                },
            )?;

            num_collected += summary.num_collected;
            max_suffix_len = max_suffix_len.max(summary.max_suffix_len);
        }

        if num_collected != super_block.num_suffixes {
            return Err(inconsistent_input());
        }

        self.stats.collecting_time += start.elapsed();

        log::debug!(
            "collected {} suffixes of buckets {:?} (longest suffix {})",
            num_collected,
            super_block.buckets,
            max_suffix_len
        );

        Ok(())
    }

    fn sort_sub_bucket<H: BwtHandler>(
        &mut self,
        range: std::ops::Range<usize>,
        handler: &mut H,
    ) -> LargeBwtResult<()> {
        let start = Instant::now();
        let ctx = self.ctx;
        let backend = ctx.backend();
        let string_set = self.string_set;
        let symbol_bits = self.symbol_bits;
        let len = range.len();

        let suffixes = self.device_suffixes.resize(len, &mut self.device_ledger)?;
        suffixes.copy_from_slice(&self.staging.as_slice()[range.clone()]);
        let suffixes = self.device_suffixes.as_slice();

        let max_suffix_len = backend.transform_reduce(
            0..len,
            0,
            |i| string_set.string_len(suffixes[i].string_id) - suffixes[i].offset,
            u32::max,
        );

        let mut num_words = radices::words_for_len(max_suffix_len, symbol_bits);
        if self.dcs.is_some() {
            num_words = num_words.min(self.dcs_words);
        }

        let indices = self.device_indices.resize(len, &mut self.device_ledger)?;
        let radix = |suffix: u32, word| {
            radices::suffix_word(string_set, suffixes[suffix as usize], word, symbol_bits)
        };

        self.delay_list.clear();
        match &self.dcs {
            Some(dcs) => {
                self.sorter.sort(
                    num_words,
                    radix,
                    indices,
                    &mut self.delay_list,
                    &mut self.device_ledger,
                )?;

                for group in self.delay_list.groups() {
                    backend.sort_by(&mut indices[group.clone()], |&a, &b| {
                        dcs.compare(string_set, suffixes[a as usize], suffixes[b as usize])
                    });
                }
            }
            // without long strings every tie is an exact duplicate, already
            // in string id order
            None => self.sorter.sort(
                num_words,
                radix,
                indices,
                &mut DiscardDelayList,
                &mut self.device_ledger,
            )?,
        }
        self.stats.num_delayed_groups += self.delay_list.groups().len();

        let indices = self.device_indices.as_slice();
        let device_bwt = self.device_bwt.resize(len, &mut self.device_ledger)?;
        backend.transform(device_bwt, |k| {
            radices::bwt_symbol(string_set, suffixes[indices[k] as usize])
        });

        let host_bwt = self.host_bwt.resize(len, &mut self.host_ledger)?;
        host_bwt.copy_from_slice(self.device_bwt.as_slice());
        self.stats.sorting_time += start.elapsed();

        log::trace!(
            "sorted a sub-bucket of {} suffixes with {} words, {} delayed groups",
            len,
            num_words,
            self.delay_list.groups().len()
        );

        handler.process(&BwtBatch {
            host_bwt: self.host_bwt.as_slice(),
            device_bwt: self.device_bwt.as_slice(),
            host_suffixes: &self.staging.as_slice()[range],
            device_suffixes: suffixes,
            device_indices: Some(indices),
        })
    }

    // the suffixes of a short bucket are equal and collected in string id
    // order, which is already their sorted order
    fn emit_oversized_bucket<H: BwtHandler>(
        &mut self,
        range: std::ops::Range<usize>,
        block_size: usize,
        handler: &mut H,
    ) -> LargeBwtResult<()> {
        let ctx = self.ctx;
        let backend = ctx.backend();
        let string_set = self.string_set;

        log::trace!("emitting an oversized bucket of {} suffixes", range.len());

        for begin in range.clone().step_by(block_size) {
            let block = begin..(begin + block_size).min(range.end);
            let len = block.len();

            let suffixes = self.device_suffixes.resize(len, &mut self.device_ledger)?;
            suffixes.copy_from_slice(&self.staging.as_slice()[block.clone()]);
            let suffixes = self.device_suffixes.as_slice();

            let device_bwt = self.device_bwt.resize(len, &mut self.device_ledger)?;
            backend.transform(device_bwt, |k| radices::bwt_symbol(string_set, suffixes[k]));

            let host_bwt = self.host_bwt.resize(len, &mut self.host_ledger)?;
            host_bwt.copy_from_slice(self.device_bwt.as_slice());

            handler.process(&BwtBatch {
                host_bwt: self.host_bwt.as_slice(),
                device_bwt: self.device_bwt.as_slice(),
                host_suffixes: &self.staging.as_slice()[block],
                device_suffixes: suffixes,
                device_indices: None,
            })?;
        }

        Ok(())
    }
}

fn inconsistent_input() -> LargeBwtError {
    LargeBwtError::InvalidInput("the string set changed between counting and collection".into())
}

/// Builds the BWT of all suffixes of `string_set` and hands it to `handler`
/// in sorted order: the terminators first, then every non-empty suffix.
///
/// Bucketing widths are tried in order, a pass that finds an unsplittable
/// bucket larger than a sorting block is redone from scratch with the next
/// width. Widths whose bucket tables do not fit the host budget count as
/// exhausted, only the first width has to fit.
pub fn large_bwt<B: Backend, S: StringSet, H: BwtHandler>(
    ctx: &ExecutionContext<B>,
    string_set: &S,
    handler: &mut H,
    params: &BwtParams,
) -> LargeBwtResult<LargeBwtStats> {
    params.validate(string_set.symbol_bits())?;

    let start = Instant::now();
    log::info!(
        "building the BWT of {} strings ({} suffixes) on the {} backend",
        string_set.num_strings(),
        string_set.num_suffixes(),
        ctx.backend().name()
    );

    let mut skeleton = LargeBwtSkeleton::new(ctx, string_set, params)?;
    skeleton.emit_dollar_batch(handler)?;

    let mut large_bucket = None;

    for bucketing_bits in skeleton.bucketing_widths() {
        match skeleton.enact(bucketing_bits, handler)? {
            LargeBwtStatus::Ok => {
                let mut stats = skeleton.into_stats();
                stats.total_time = start.elapsed();

                log::info!(
                    "built the BWT of {} positions with {} bit buckets in {:?}",
                    stats.num_suffixes,
                    stats.bucketing_bits,
                    stats.total_time
                );

                return Ok(stats);
            }
            LargeBwtStatus::LargeBucket {
                bucket_index,
                bucket_size,
            } => {
                log::info!(
                    "bucket {} holds {} suffixes at {} bits, too many for one block",
                    bucket_index,
                    bucket_size,
                    bucketing_bits
                );
                large_bucket = Some((bucket_index, bucket_size));
            }
        }
    }

    match large_bucket {
        Some((bucket_index, bucket_size)) => Err(LargeBwtError::large_bucket(
            bucket_index,
            bucket_size,
            DEVICE_BYTES_PER_SUFFIX,
        )),
        None => Err(LargeBwtError::InvalidParams(
            "no bucketing width to try".into(),
        )),
    }
}
