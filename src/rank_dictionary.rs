//! Occurrence counts over a BWT
//!
//! Counts are sampled every `interval` positions, a query scans at most one
//! interval of the packed text. Terminators are kept in a separate bit vector
//! and never counted as a symbol.

use bitvec::prelude::*;

use crate::algorithm::radices::DOLLAR_SYMBOL;
use crate::error::{LargeBwtError, LargeBwtResult};
use crate::packed::{PackedLayout, PackedString};

#[derive(Debug, Clone)]
pub struct RankDictionary {
    text: PackedString<u64>,
    dollars: BitVec,
    interval: u64,
    alphabet_size: usize,
    // alphabet_size counts per sampled position
    samples: Vec<u64>,
    // terminators first, then the symbols in ascending order
    count_less: Vec<u64>,
}

impl RankDictionary {
    pub fn new(symbols: &[u8], symbol_bits: u32, interval: u64) -> LargeBwtResult<Self> {
        if interval == 0 {
            return Err(LargeBwtError::InvalidParams(
                "rank sampling interval must be positive".into(),
            ));
        }

        let layout = PackedLayout::new(symbol_bits, false)?;
        let alphabet_size = layout.alphabet_size();

        let mut text = PackedString::new(layout);
        let mut dollars = BitVec::repeat(false, symbols.len());
        let mut counts = vec![0u64; alphabet_size];
        let num_samples = (symbols.len() as u64 / interval + 1) as usize;
        let mut samples = Vec::with_capacity(num_samples * alphabet_size);

        for (i, &symbol) in symbols.iter().enumerate() {
            if i as u64 % interval == 0 {
                samples.extend_from_slice(&counts);
            }

            if symbol == DOLLAR_SYMBOL {
                dollars.set(i, true);
                text.push(0)?;
            } else {
                text.push(symbol)?;
                counts[symbol as usize] += 1;
            }
        }

        if symbols.len() as u64 % interval == 0 {
            samples.extend_from_slice(&counts);
        }

        let mut count_less = Vec::with_capacity(alphabet_size + 1);
        let mut total = dollars.count_ones() as u64;
        for &count in &counts {
            count_less.push(total);
            total += count;
        }
        count_less.push(total);

        Ok(Self {
            text,
            dollars,
            interval,
            alphabet_size,
            samples,
            count_less,
        })
    }

    pub fn len(&self) -> u64 {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn num_dollars(&self) -> u64 {
        self.dollars.count_ones() as u64
    }

    /// The symbol at `position`, `DOLLAR_SYMBOL` for a terminator
    pub fn symbol(&self, position: u64) -> u8 {
        if self.dollars[position as usize] {
            DOLLAR_SYMBOL
        } else {
            self.text.get(position)
        }
    }

    /// Occurrences of `symbol` in `[0, position)`
    pub fn rank(&self, position: u64, symbol: u8) -> u64 {
        assert!(position <= self.len(), "position {} out of bounds", position);

        let block = position / self.interval;
        let mut rank = self.samples[block as usize * self.alphabet_size + symbol as usize];

        for i in block * self.interval..position {
            if self.text.get(i) == symbol && !self.dollars[i as usize] {
                rank += 1;
            }
        }

        rank
    }

    /// Number of positions holding a terminator or a symbol smaller than
    /// `symbol`, i.e. the first sorted row starting with `symbol`
    pub fn count_less(&self, symbol: u8) -> u64 {
        self.count_less[symbol as usize]
    }

    /// Maps the row of a suffix to the row of the suffix one symbol longer
    #[inline]
    pub fn lf(&self, position: u64) -> Option<u64> {
        match self.symbol(position) {
            DOLLAR_SYMBOL => None,
            symbol => Some(self.count_less(symbol) + self.rank(position, symbol)),
        }
    }
}
