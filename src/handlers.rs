//! Consumers of the sorted BWT batches
//!
//! A run hands its output to a [`BwtHandler`] one batch at a time, in global
//! sorted order. Batch buffers are reused by the engine, so a handler has to
//! copy whatever it wants to keep before `process` returns.

use crate::algorithm::radices::DOLLAR_SYMBOL;
use crate::error::{LargeBwtError, LargeBwtResult};
use crate::packed::{PackedLayout, PackedString, PackedWord};
use crate::string_set::SuffixCoord;

/// One batch of consecutive BWT positions
#[derive(Debug, Clone, Copy)]
pub struct BwtBatch<'a> {
    /// BWT symbols in sorted order, `DOLLAR_SYMBOL` marks a terminator
    pub host_bwt: &'a [u8],
    /// Scratch-side copy of `host_bwt`
    pub device_bwt: &'a [u8],
    /// Suffix coordinates in collection order
    pub host_suffixes: &'a [SuffixCoord],
    /// Scratch-side copy of `host_suffixes`
    pub device_suffixes: &'a [SuffixCoord],
    /// Sorted order as indices into the suffix coordinates, `None` if the
    /// coordinates are already sorted
    pub device_indices: Option<&'a [u32]>,
}

impl BwtBatch<'_> {
    pub fn len(&self) -> usize {
        self.host_bwt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host_bwt.is_empty()
    }

    /// The suffix at sorted position `k` of the batch
    #[inline]
    pub fn suffix(&self, k: usize) -> SuffixCoord {
        match self.device_indices {
            Some(indices) => self.device_suffixes[indices[k] as usize],
            None => self.device_suffixes[k],
        }
    }
}

pub trait BwtHandler {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()>;
}

impl<H: BwtHandler + ?Sized> BwtHandler for &mut H {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        (**self).process(batch)
    }
}

/// A BWT sink that can drop the terminator of a single string afterwards
pub trait BwtOutput: BwtHandler {
    fn remove_symbol(&mut self, position: u64);
}

/// Collects the BWT into an unpacked buffer
#[derive(Debug, Clone, Default)]
pub struct HostBwtHandler {
    bwt: Vec<u8>,
}

impl HostBwtHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bwt(&self) -> &[u8] {
        &self.bwt
    }

    pub fn into_bwt(self) -> Vec<u8> {
        self.bwt
    }
}

impl BwtHandler for HostBwtHandler {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        self.bwt.extend_from_slice(batch.host_bwt);
        Ok(())
    }
}

impl BwtOutput for HostBwtHandler {
    fn remove_symbol(&mut self, position: u64) {
        self.bwt.remove(position as usize);
    }
}

/// Collects the BWT into a packed string. Terminators are stored as symbol 0
/// and their positions are kept separately.
#[derive(Debug, Clone)]
pub struct PackedBwtHandler<W: PackedWord = u32> {
    bwt: PackedString<W>,
    dollars: Vec<u64>,
}

impl<W: PackedWord> PackedBwtHandler<W> {
    pub fn new(layout: PackedLayout) -> Self {
        Self {
            bwt: PackedString::new(layout),
            dollars: Vec::new(),
        }
    }

    pub fn bwt(&self) -> &PackedString<W> {
        &self.bwt
    }

    /// Ascending positions of the terminators
    pub fn dollars(&self) -> &[u64] {
        &self.dollars
    }

    pub fn into_parts(self) -> (PackedString<W>, Vec<u64>) {
        (self.bwt, self.dollars)
    }

    fn put(&mut self, position: u64, symbol: u8) -> LargeBwtResult<()> {
        if symbol == DOLLAR_SYMBOL {
            self.dollars.push(position);
            self.bwt.set(position, 0)
        } else {
            self.bwt.set(position, symbol)
        }
    }
}

impl<W: PackedWord> BwtHandler for PackedBwtHandler<W> {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        let symbols = batch.host_bwt;
        let begin = self.bwt.len();
        let len = symbols.len() as u64;
        let layout = self.bwt.layout();
        let symbols_per_word = layout.symbols_per_word::<W>();

        self.bwt.resize(begin + len);

        // up to the next word boundary
        let head = ((symbols_per_word - begin % symbols_per_word) % symbols_per_word).min(len);
        for k in 0..head {
            self.put(begin + k, symbols[k as usize])?;
        }

        let num_words = (len - head) / symbols_per_word;
        let first_word = ((begin + head) / symbols_per_word) as usize;

        for w in 0..num_words {
            let mut packed = W::zero();

            for slot in 0..symbols_per_word {
                let k = head + w * symbols_per_word + slot;
                let mut symbol = symbols[k as usize];

                if symbol == DOLLAR_SYMBOL {
                    self.dollars.push(begin + k);
                    symbol = 0;
                } else if symbol as usize >= layout.alphabet_size() {
                    return Err(LargeBwtError::InvalidInput(format!(
                        "symbol {} does not fit into {} bits",
                        symbol, layout.symbol_bits()
                    )));
                }

                packed = packed | (W::from_symbol(symbol) << layout.shift::<W>(slot));
            }

            self.bwt.words_mut()[first_word + w as usize] = packed;
        }

        for k in head + num_words * symbols_per_word..len {
            self.put(begin + k, symbols[k as usize])?;
        }

        Ok(())
    }
}

impl<W: PackedWord> BwtOutput for PackedBwtHandler<W> {
    fn remove_symbol(&mut self, position: u64) {
        self.bwt.remove(position);

        self.dollars.retain(|&dollar| dollar != position);
        for dollar in &mut self.dollars {
            if *dollar > position {
                *dollar -= 1;
            }
        }
    }
}

/// Suffix coordinates of every `modulus`-th sorted position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledSuffixArray {
    modulus: u64,
    samples: Vec<SuffixCoord>,
    len: u64,
}

impl SampledSuffixArray {
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Number of sorted positions the samples were taken from
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn samples(&self) -> &[SuffixCoord] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<SuffixCoord> {
        self.samples
    }

    pub fn get(&self, rank: u64) -> Option<SuffixCoord> {
        if rank % self.modulus == 0 {
            self.samples.get((rank / self.modulus) as usize).copied()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SsaHandler {
    ssa: SampledSuffixArray,
}

impl SsaHandler {
    pub fn new(modulus: u64) -> Self {
        assert!(modulus > 0, "sampling modulus must be positive");

        Self {
            ssa: SampledSuffixArray {
                modulus,
                samples: Vec::new(),
                len: 0,
            },
        }
    }

    pub fn ssa(&self) -> &SampledSuffixArray {
        &self.ssa
    }

    pub fn into_ssa(self) -> SampledSuffixArray {
        self.ssa
    }
}

impl BwtHandler for SsaHandler {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        let modulus = self.ssa.modulus;
        let first = (modulus - self.ssa.len % modulus) % modulus;

        for k in (first..batch.len() as u64).step_by(modulus as usize) {
            self.ssa.samples.push(batch.suffix(k as usize));
        }

        self.ssa.len += batch.len() as u64;
        Ok(())
    }
}

/// Feeds every batch to a BWT handler and an SSA handler
#[derive(Debug, Clone)]
pub struct BwtSsaHandler<H> {
    bwt: H,
    ssa: SsaHandler,
}

impl<H: BwtHandler> BwtSsaHandler<H> {
    pub fn new(bwt: H, modulus: u64) -> Self {
        Self {
            bwt,
            ssa: SsaHandler::new(modulus),
        }
    }

    pub fn into_parts(self) -> (H, SampledSuffixArray) {
        (self.bwt, self.ssa.into_ssa())
    }
}

impl<H: BwtHandler> BwtHandler for BwtSsaHandler<H> {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        self.bwt.process(batch)?;
        self.ssa.process(batch)
    }
}

impl<H: BwtOutput> BwtOutput for BwtSsaHandler<H> {
    fn remove_symbol(&mut self, position: u64) {
        self.bwt.remove_symbol(position);
    }
}

/// Only counts what passes by, for dry runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardBwtHandler {
    pub num_batches: u64,
    pub num_symbols: u64,
}

impl BwtHandler for DiscardBwtHandler {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        self.num_batches += 1;
        self.num_symbols += batch.len() as u64;
        Ok(())
    }
}

/// Turns the string-set output of a single string into a classical BWT:
/// remembers where the terminator went and drops it when finished
#[derive(Debug, Clone)]
pub struct StringBwtHandler<O> {
    output: O,
    position: u64,
    primary: Option<u64>,
}

impl<O: BwtOutput> StringBwtHandler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            position: 0,
            primary: None,
        }
    }

    /// The output without the terminator, and the position it was removed from
    pub fn finish(mut self) -> LargeBwtResult<(O, u64)> {
        let Some(primary) = self.primary else {
            return Err(LargeBwtError::InvalidInput(
                "the BWT holds no terminator".into(),
            ));
        };

        self.output.remove_symbol(primary);
        Ok((self.output, primary))
    }
}

impl<O: BwtOutput> BwtHandler for StringBwtHandler<O> {
    fn process(&mut self, batch: &BwtBatch) -> LargeBwtResult<()> {
        if let Some(k) = batch.host_bwt.iter().position(|&symbol| symbol == DOLLAR_SYMBOL) {
            if self.primary.is_some() {
                return Err(LargeBwtError::InvalidInput(
                    "more than one terminator in a single string BWT".into(),
                ));
            }

            self.primary = Some(self.position + k as u64);
        }

        self.output.process(batch)?;
        self.position += batch.len() as u64;
        Ok(())
    }
}
