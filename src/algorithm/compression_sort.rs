use std::ops::Range;

use crate::error::LargeBwtResult;
use crate::primitives::{Backend, ExecutionContext};

use super::buffer_management::{MemoryLedger, ScratchBuffer};

const WORD_MASK: u64 = 0xFFFF_FFFF;

/// Receives the groups of sorted slots that are still tied after the last
/// compared word
pub trait DelayList {
    fn push(&mut self, slots: Range<usize>);
}

/// Leaves tied groups in their current (stable) order
#[derive(Debug, Default)]
pub struct DiscardDelayList;

impl DelayList for DiscardDelayList {
    fn push(&mut self, _slots: Range<usize>) {}
}

#[derive(Debug, Default)]
pub struct GroupDelayList {
    groups: Vec<Range<usize>>,
}

impl GroupDelayList {
    pub fn groups(&self) -> &[Range<usize>] {
        &self.groups
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

impl DelayList for GroupDelayList {
    fn push(&mut self, slots: Range<usize>) {
        self.groups.push(slots);
    }
}

/// Most significant word first radix sort over a block of suffixes.
///
/// Only suffixes that are still tied with a neighbour stay active: every pass
/// stable-sorts the active suffixes by `(segment head, next word)` and then
/// compacts away the ones that became unique.
pub struct CompressionSort<'c, B: Backend> {
    ctx: &'c ExecutionContext<B>,
    // (segment head slot << 32 | word, suffix index)
    pairs: ScratchBuffer<(u64, u32)>,
    slots: ScratchBuffer<u32>,
}

impl<'c, B: Backend> CompressionSort<'c, B> {
    pub fn new(ctx: &'c ExecutionContext<B>) -> Self {
        Self {
            ctx,
            pairs: ScratchBuffer::new("sort pairs"),
            slots: ScratchBuffer::new("sort slots"),
        }
    }

    pub fn reserve(&mut self, max_len: usize, ledger: &mut MemoryLedger) -> LargeBwtResult<()> {
        self.pairs.reserve_at_least(max_len, ledger)?;
        self.slots.reserve_at_least(max_len, ledger)
    }

    /// Writes into `indices` the permutation that orders the suffixes
    /// `0..indices.len()` by their first `num_words` words, `radix(suffix, word)`
    /// returning the words. Ties keep their input order and are reported to
    /// `delay_list`.
    pub fn sort<F, D>(
        &mut self,
        num_words: u32,
        radix: F,
        indices: &mut [u32],
        delay_list: &mut D,
        ledger: &mut MemoryLedger,
    ) -> LargeBwtResult<()>
    where
        F: Fn(u32, u32) -> u32 + Sync + Send,
        D: DelayList,
    {
        let ctx = self.ctx;
        let backend = ctx.backend();
        let n = indices.len();

        backend.transform(indices, |i| i as u32);
        if n <= 1 {
            return Ok(());
        }

        let pairs = self.pairs.resize(n, ledger)?;
        let slots = self.slots.resize(n, ledger)?;
        backend.transform(pairs, |i| (0, i as u32));
        backend.transform(slots, |i| i as u32);

        let mut num_active = n;

        for word in 0..num_words {
            let active = &mut pairs[..num_active];

            backend.for_each_mut(active, |_, pair| {
                pair.0 = (pair.0 & !WORD_MASK) | radix(pair.1, word) as u64;
            });
            backend.sort_by_key(active, |pair| pair.0);

            for (pair, &slot) in active.iter().zip(slots.iter()) {
                indices[slot as usize] = pair.1;
            }

            // keep the members of groups with at least two suffixes, tagged
            // with the slot their group starts at
            let mut num_kept = 0;
            let mut previous_key = None;
            let mut head_slot = 0;

            for k in 0..num_active {
                let key = pairs[k].0;
                let is_head = previous_key != Some(key);
                let has_successor = k + 1 < num_active && pairs[k + 1].0 == key;
                previous_key = Some(key);

                if is_head {
                    head_slot = slots[k];
                }

                if !is_head || has_successor {
                    pairs[num_kept] = ((head_slot as u64) << 32, pairs[k].1);
                    slots[num_kept] = slots[k];
                    num_kept += 1;
                }
            }

            num_active = num_kept;
            if num_active == 0 {
                return Ok(());
            }
        }

        let mut begin = 0;
        while begin < num_active {
            let segment = pairs[begin].0 & !WORD_MASK;
            let mut end = begin + 1;

            while end < num_active && pairs[end].0 & !WORD_MASK == segment {
                end += 1;
            }

            delay_list.push(slots[begin] as usize..slots[end - 1] as usize + 1);
            begin = end;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{Parallel, Sequential};

    fn sort_words<B: Backend>(
        ctx: &ExecutionContext<B>,
        words: &[Vec<u32>],
        num_words: u32,
    ) -> (Vec<u32>, Vec<Range<usize>>) {
        let mut sorter = CompressionSort::new(ctx);
        let mut ledger = MemoryLedger::unbounded("device");
        let mut indices = vec![0u32; words.len()];
        let mut delay_list = GroupDelayList::default();

        sorter
            .sort(
                num_words,
                |suffix, word| words[suffix as usize][word as usize],
                &mut indices,
                &mut delay_list,
                &mut ledger,
            )
            .unwrap();

        (indices, delay_list.groups().to_vec())
    }

    #[test]
    fn test_compression_sort_orders_words() {
        let words = vec![
            vec![3, 1, 0],
            vec![1, 2, 2],
            vec![3, 0, 5],
            vec![1, 2, 1],
            vec![0, 9, 9],
        ];

        for (indices, groups) in [
            sort_words(&ExecutionContext::new(Sequential), &words, 3),
            sort_words(&ExecutionContext::new(Parallel::new(Some(2)).unwrap()), &words, 3),
        ] {
            assert_eq!(indices, [4, 3, 1, 2, 0]);
            assert!(groups.is_empty());
        }
    }

    #[test]
    fn test_compression_sort_delays_ties() {
        let words = vec![
            vec![2, 7],
            vec![1, 5],
            vec![2, 6],
            vec![1, 4],
            vec![2, 5],
            vec![0, 0],
        ];

        let (indices, groups) = sort_words(&ExecutionContext::new(Sequential), &words, 1);

        // ties keep their input order
        assert_eq!(indices, [5, 1, 3, 0, 2, 4]);
        assert_eq!(groups, [1..3, 3..6]);

        let (indices, groups) = sort_words(&ExecutionContext::new(Sequential), &words, 2);
        assert_eq!(indices, [5, 3, 1, 4, 2, 0]);
        assert!(groups.is_empty());
    }
}
