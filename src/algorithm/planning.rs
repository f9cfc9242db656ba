use std::ops::Range;

use crate::error::{LargeBwtError, LargeBwtResult};

use super::buffer_management::BlockSizes;
use super::radices;

/// Consecutive buckets collected together into the host staging buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub buckets: Range<u32>,
    pub num_suffixes: u64,
    /// global rank of the first suffix in the block
    pub suffix_offset: u64,
    pub sub_buckets: Vec<SubBucket>,
}

/// The unit of exact sorting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubBucket {
    /// consecutive buckets sorted together on the device
    Merged { buckets: Range<u32>, num_suffixes: u64 },
    /// a short-string bucket too large for one block, its suffixes are
    /// identical and already in string order, so it is emitted in blocks unsorted
    Oversized { bucket: u32, num_suffixes: u64 },
}

impl SubBucket {
    pub fn num_suffixes(&self) -> u64 {
        match self {
            SubBucket::Merged { num_suffixes, .. } | SubBucket::Oversized { num_suffixes, .. } => {
                *num_suffixes
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPlan {
    pub super_blocks: Vec<SuperBlock>,
    pub largest_super_block: u64,
    pub largest_merged_sub_bucket: u64,
}

impl BucketPlan {
    pub fn num_sub_buckets(&self) -> usize {
        self.super_blocks
            .iter()
            .map(|super_block| super_block.sub_buckets.len())
            .sum()
    }

    pub fn num_oversized_buckets(&self) -> usize {
        self.super_blocks
            .iter()
            .flat_map(|super_block| &super_block.sub_buckets)
            .filter(|sub_bucket| matches!(sub_bucket, SubBucket::Oversized { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Planned(BucketPlan),
    LargeBucket { bucket_index: u32, bucket_size: u64 },
}

/// Partitions the buckets into super-blocks and sub-buckets that respect the
/// block sizes. Buckets without suffixes produce no sub-bucket and empty
/// super-blocks are left out.
pub fn plan_buckets(counts: &[u64], sizes: BlockSizes) -> LargeBwtResult<PlanOutcome> {
    if let Some((bucket_index, bucket_size)) = largest_splittable_bucket(counts, sizes)? {
        if bucket_size > sizes.max_block_size {
            return Ok(PlanOutcome::LargeBucket {
                bucket_index,
                bucket_size,
            });
        }
    }

    let mut super_blocks = Vec::new();
    let mut suffix_offset = 0;
    let mut bucket_begin = 0;
    let num_buckets = counts.len() as u32;

    while bucket_begin < num_buckets {
        // grow the super-block as long as it fits the host buffer
        let mut bucket_end = bucket_begin;
        let mut num_suffixes = 0;

        while bucket_end < num_buckets
            && num_suffixes + counts[bucket_end as usize] <= sizes.max_super_block_size
        {
            num_suffixes += counts[bucket_end as usize];
            bucket_end += 1;
        }

        // checked upfront, a single bucket always fits
        debug_assert!(bucket_end > bucket_begin);

        if num_suffixes > 0 {
            super_blocks.push(SuperBlock {
                buckets: bucket_begin..bucket_end,
                num_suffixes,
                suffix_offset,
                sub_buckets: plan_sub_buckets(
                    counts,
                    bucket_begin..bucket_end,
                    sizes.max_block_size,
                ),
            });
        }

        suffix_offset += num_suffixes;
        bucket_begin = bucket_end;
    }

    let largest_super_block = super_blocks
        .iter()
        .map(|super_block| super_block.num_suffixes)
        .max()
        .unwrap_or(0);

    let largest_merged_sub_bucket = super_blocks
        .iter()
        .flat_map(|super_block| &super_block.sub_buckets)
        .filter_map(|sub_bucket| match sub_bucket {
            SubBucket::Merged { num_suffixes, .. } => Some(*num_suffixes),
            SubBucket::Oversized { .. } => None,
        })
        .max()
        .unwrap_or(0);

    Ok(PlanOutcome::Planned(BucketPlan {
        super_blocks,
        largest_super_block,
        largest_merged_sub_bucket,
    }))
}

/// The largest bucket that is not a short-string bucket, as
/// `(bucket index, size)`. Fails if any bucket alone overflows the host buffer.
fn largest_splittable_bucket(
    counts: &[u64],
    sizes: BlockSizes,
) -> LargeBwtResult<Option<(u32, u64)>> {
    let mut largest: Option<(u32, u64)> = None;

    for (bucket, &count) in counts.iter().enumerate() {
        let bucket = bucket as u32;

        if count > sizes.max_super_block_size {
            return Err(LargeBwtError::BufferOverflow {
                bucket_index: bucket,
                bucket_size: count,
                capacity: sizes.max_super_block_size,
            });
        }

        if count > 0
            && !radices::is_short_bucket(bucket)
            && largest.is_none_or(|(_, size)| count > size)
        {
            largest = Some((bucket, count));
        }
    }

    Ok(largest)
}

fn plan_sub_buckets(counts: &[u64], buckets: Range<u32>, max_block_size: u64) -> Vec<SubBucket> {
    let mut sub_buckets = Vec::new();
    let mut bucket_begin = buckets.start;

    while bucket_begin < buckets.end {
        let count = counts[bucket_begin as usize];

        if count > max_block_size {
            sub_buckets.push(SubBucket::Oversized {
                bucket: bucket_begin,
                num_suffixes: count,
            });
            bucket_begin += 1;
            continue;
        }

        let mut bucket_end = bucket_begin;
        let mut num_suffixes = 0;

        while bucket_end < buckets.end
            && num_suffixes + counts[bucket_end as usize] <= max_block_size
        {
            num_suffixes += counts[bucket_end as usize];
            bucket_end += 1;
        }

        if num_suffixes > 0 {
            sub_buckets.push(SubBucket::Merged {
                buckets: bucket_begin..bucket_end,
                num_suffixes,
            });
        }

        bucket_begin = bucket_end;
    }

    sub_buckets
}
