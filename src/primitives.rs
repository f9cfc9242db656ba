//! Bulk data-parallel primitives
//!
//! Every component of the engine issues its work through a [`Backend`], one
//! blocking bulk call at a time. [`Sequential`] runs the calls on the calling
//! thread, [`Parallel`] spreads them over a rayon thread pool.

use std::cmp::Ordering;
use std::ops::Range;

use rayon::prelude::*;

use crate::error::LargeBwtResult;

// below this many elements per chunk, scans are not split any further
const MIN_SCAN_CHUNK: usize = 4096;

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `output[i] = op(i)`
    fn transform<T, F>(&self, output: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    fn for_each_mut<T, F>(&self, data: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send;

    fn reduce<T, F>(&self, input: &[T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send;

    fn transform_reduce<U, M, F>(&self, range: Range<usize>, identity: U, map: M, op: F) -> U
    where
        U: Copy + Send + Sync,
        M: Fn(usize) -> U + Sync + Send,
        F: Fn(U, U) -> U + Sync + Send;

    /// In-place inclusive scan, `op` must be associative with `identity` as
    /// neutral element. Returns the total.
    fn inclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send;

    /// In-place exclusive scan, returns the total
    fn exclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send;

    /// Appends the elements satisfying `pred` to `output`, keeping their order.
    /// Returns the number of appended elements.
    fn copy_if<T, F>(&self, input: &[T], output: &mut Vec<T>, pred: F) -> usize
    where
        T: Copy + Send + Sync,
        F: Fn(&T) -> bool + Sync + Send;

    /// Stable
    fn sort_by_key<T, K, F>(&self, data: &mut [T], key: F)
    where
        T: Send,
        K: Ord,
        F: Fn(&T) -> K + Sync + Send;

    /// Stable
    fn sort_by<T, F>(&self, data: &mut [T], compare: F)
    where
        T: Send,
        F: Fn(&T, &T) -> Ordering + Sync + Send;

    fn sort_unstable<T: Ord + Send>(&self, data: &mut [T]);

    /// Replaces the content of `runs` with `(value, run length)` pairs
    fn run_length_encode<T>(&self, input: &[T], runs: &mut Vec<(T, u64)>)
    where
        T: Copy + PartialEq + Send + Sync;
}

/// Runs every primitive on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Backend for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn transform<T, F>(&self, output: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        for (i, value) in output.iter_mut().enumerate() {
            *value = op(i);
        }
    }

    fn for_each_mut<T, F>(&self, data: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        for (i, value) in data.iter_mut().enumerate() {
            op(i, value);
        }
    }

    fn reduce<T, F>(&self, input: &[T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        input.iter().fold(identity, |acc, &value| op(acc, value))
    }

    fn transform_reduce<U, M, F>(&self, range: Range<usize>, identity: U, map: M, op: F) -> U
    where
        U: Copy + Send + Sync,
        M: Fn(usize) -> U + Sync + Send,
        F: Fn(U, U) -> U + Sync + Send,
    {
        range.fold(identity, |acc, i| op(acc, map(i)))
    }

    fn inclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        inclusive_scan_serial(data, identity, &op)
    }

    fn exclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        exclusive_scan_serial(data, identity, &op)
    }

    fn copy_if<T, F>(&self, input: &[T], output: &mut Vec<T>, pred: F) -> usize
    where
        T: Copy + Send + Sync,
        F: Fn(&T) -> bool + Sync + Send,
    {
        let old_len = output.len();
        output.extend(input.iter().filter(|&value| pred(value)).copied());
        output.len() - old_len
    }

    fn sort_by_key<T, K, F>(&self, data: &mut [T], key: F)
    where
        T: Send,
        K: Ord,
        F: Fn(&T) -> K + Sync + Send,
    {
        data.sort_by_key(key);
    }

    fn sort_by<T, F>(&self, data: &mut [T], compare: F)
    where
        T: Send,
        F: Fn(&T, &T) -> Ordering + Sync + Send,
    {
        data.sort_by(compare);
    }

    fn sort_unstable<T: Ord + Send>(&self, data: &mut [T]) {
        data.sort_unstable();
    }

    fn run_length_encode<T>(&self, input: &[T], runs: &mut Vec<(T, u64)>)
    where
        T: Copy + PartialEq + Send + Sync,
    {
        runs.clear();

        for &value in input {
            match runs.last_mut() {
                Some((last, count)) if *last == value => *count += 1,
                _ => runs.push((value, 1)),
            }
        }
    }
}

/// Runs the primitives on rayon, either on the global pool or a dedicated one
#[derive(Debug, Default)]
pub struct Parallel {
    pool: Option<rayon::ThreadPool>,
}

impl Parallel {
    pub fn new(num_threads: Option<usize>) -> LargeBwtResult<Self> {
        let pool = match num_threads {
            Some(num_threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|index| format!("large-bwt-{}", index))
                    .build()?,
            ),
            None => None,
        };

        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn scan_chunk_len(&self, len: usize) -> usize {
        len.div_ceil(self.num_threads()).max(MIN_SCAN_CHUNK)
    }
}

impl Backend for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn transform<T, F>(&self, output: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.install(|| {
            output
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, value)| *value = op(i))
        });
    }

    fn for_each_mut<T, F>(&self, data: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        self.install(|| {
            data.par_iter_mut()
                .enumerate()
                .for_each(|(i, value)| op(i, value))
        });
    }

    fn reduce<T, F>(&self, input: &[T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        self.install(|| input.par_iter().copied().reduce(|| identity, &op))
    }

    fn transform_reduce<U, M, F>(&self, range: Range<usize>, identity: U, map: M, op: F) -> U
    where
        U: Copy + Send + Sync,
        M: Fn(usize) -> U + Sync + Send,
        F: Fn(U, U) -> U + Sync + Send,
    {
        self.install(|| range.into_par_iter().map(&map).reduce(|| identity, &op))
    }

    fn inclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        let chunk_len = self.scan_chunk_len(data.len());
        if data.len() <= chunk_len {
            return inclusive_scan_serial(data, identity, &op);
        }

        self.install(|| {
            let totals: Vec<T> = data
                .par_chunks_mut(chunk_len)
                .map(|chunk| inclusive_scan_serial(chunk, identity, &op))
                .collect();

            let mut carries = totals;
            let total = exclusive_scan_serial(&mut carries, identity, &op);

            data.par_chunks_mut(chunk_len)
                .zip(carries.par_iter())
                .for_each(|(chunk, &carry)| {
                    for value in chunk {
                        *value = op(carry, *value);
                    }
                });

            total
        })
    }

    fn exclusive_scan<T, F>(&self, data: &mut [T], identity: T, op: F) -> T
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync + Send,
    {
        let chunk_len = self.scan_chunk_len(data.len());
        if data.len() <= chunk_len {
            return exclusive_scan_serial(data, identity, &op);
        }

        self.install(|| {
            let totals: Vec<T> = data
                .par_chunks_mut(chunk_len)
                .map(|chunk| exclusive_scan_serial(chunk, identity, &op))
                .collect();

            let mut carries = totals;
            let total = exclusive_scan_serial(&mut carries, identity, &op);

            data.par_chunks_mut(chunk_len)
                .zip(carries.par_iter())
                .for_each(|(chunk, &carry)| {
                    for value in chunk {
                        *value = op(carry, *value);
                    }
                });

            total
        })
    }

    fn copy_if<T, F>(&self, input: &[T], output: &mut Vec<T>, pred: F) -> usize
    where
        T: Copy + Send + Sync,
        F: Fn(&T) -> bool + Sync + Send,
    {
        let old_len = output.len();
        self.install(|| output.par_extend(input.par_iter().filter(|&value| pred(value)).copied()));
        output.len() - old_len
    }

    fn sort_by_key<T, K, F>(&self, data: &mut [T], key: F)
    where
        T: Send,
        K: Ord,
        F: Fn(&T) -> K + Sync + Send,
    {
        self.install(|| data.par_sort_by_key(key));
    }

    fn sort_by<T, F>(&self, data: &mut [T], compare: F)
    where
        T: Send,
        F: Fn(&T, &T) -> Ordering + Sync + Send,
    {
        self.install(|| data.par_sort_by(compare));
    }

    fn sort_unstable<T: Ord + Send>(&self, data: &mut [T]) {
        self.install(|| data.par_sort_unstable());
    }

    fn run_length_encode<T>(&self, input: &[T], runs: &mut Vec<(T, u64)>)
    where
        T: Copy + PartialEq + Send + Sync,
    {
        runs.clear();

        self.install(|| {
            let heads: Vec<usize> = (0..input.len())
                .into_par_iter()
                .filter(|&i| i == 0 || input[i] != input[i - 1])
                .collect();

            runs.par_extend(heads.par_iter().enumerate().map(|(k, &head)| {
                let end = heads.get(k + 1).copied().unwrap_or(input.len());
                (input[head], (end - head) as u64)
            }));
        });
    }
}

fn inclusive_scan_serial<T: Copy, F: Fn(T, T) -> T>(data: &mut [T], identity: T, op: &F) -> T {
    let mut acc = identity;

    for value in data.iter_mut() {
        acc = op(acc, *value);
        *value = acc;
    }

    acc
}

fn exclusive_scan_serial<T: Copy, F: Fn(T, T) -> T>(data: &mut [T], identity: T, op: &F) -> T {
    let mut acc = identity;

    for value in data.iter_mut() {
        let next = op(acc, *value);
        *value = acc;
        acc = next;
    }

    acc
}

/// Handle to the backend of one run, passed explicitly to every component
#[derive(Debug)]
pub struct ExecutionContext<B: Backend> {
    backend: B,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
