//! Bit-packed symbol storage
//!
//! Symbols of `symbol_bits` bits are stored `symbols_per_word` to a storage
//! word. Within a word, slot `j` either starts at bit `j * symbol_bits`
//! (little endian) or ends at the most significant bit side
//! (big endian, slot 0 occupies the top bits).

use std::mem;

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use serde::{Deserialize, Serialize};

use crate::error::{LargeBwtError, LargeBwtResult};

pub const MIN_SYMBOL_BITS: u32 = 2;
pub const MAX_SYMBOL_BITS: u32 = 7;

pub trait PackedWord: PrimInt + Unsigned + AsPrimitive<u64> + Default + Send + Sync + 'static {
    const BITS: u32;

    fn from_symbol(symbol: u8) -> Self;
}

macro_rules! impl_packed_word {
    ($($word:ty),*) => {
        $(
            impl PackedWord for $word {
                const BITS: u32 = (mem::size_of::<$word>() * 8) as u32;

                fn from_symbol(symbol: u8) -> Self {
                    symbol as $word
                }
            }
        )*
    };
}

impl_packed_word!(u8, u16, u32, u64);

/// Symbol width and bit order of packed words. Only constructible with a
/// width in `[MIN_SYMBOL_BITS, MAX_SYMBOL_BITS]`, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LayoutFields")]
pub struct PackedLayout {
    symbol_bits: u32,
    big_endian: bool,
}

#[derive(Deserialize)]
struct LayoutFields {
    symbol_bits: u32,
    big_endian: bool,
}

impl TryFrom<LayoutFields> for PackedLayout {
    type Error = LargeBwtError;

    fn try_from(fields: LayoutFields) -> LargeBwtResult<Self> {
        Self::new(fields.symbol_bits, fields.big_endian)
    }
}

impl PackedLayout {
    pub fn new(symbol_bits: u32, big_endian: bool) -> LargeBwtResult<Self> {
        if !(MIN_SYMBOL_BITS..=MAX_SYMBOL_BITS).contains(&symbol_bits) {
            return Err(LargeBwtError::InvalidInput(format!(
                "symbol width {} is outside [{}, {}]",
                symbol_bits, MIN_SYMBOL_BITS, MAX_SYMBOL_BITS
            )));
        }

        Ok(Self {
            symbol_bits,
            big_endian,
        })
    }

    pub fn symbol_bits(&self) -> u32 {
        self.symbol_bits
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn alphabet_size(&self) -> usize {
        1 << self.symbol_bits
    }

    pub fn symbols_per_word<W: PackedWord>(&self) -> u64 {
        (W::BITS / self.symbol_bits) as u64
    }

    #[inline]
    pub fn shift<W: PackedWord>(&self, slot: u64) -> usize {
        let bit_idx = slot as u32 * self.symbol_bits;

        if self.big_endian {
            (W::BITS - self.symbol_bits - bit_idx) as usize
        } else {
            bit_idx as usize
        }
    }

    fn symbol_mask<W: PackedWord>(&self) -> W {
        (W::one() << self.symbol_bits as usize) - W::one()
    }
}

/// A growable sequence of packed symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedString<W: PackedWord = u32> {
    words: Vec<W>,
    len: u64,
    layout: PackedLayout,
}

impl<W: PackedWord> PackedString<W> {
    pub fn new(layout: PackedLayout) -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            layout,
        }
    }

    pub fn from_symbols(layout: PackedLayout, symbols: &[u8]) -> LargeBwtResult<Self> {
        let mut string = Self::new(layout);
        string.extend_from_symbols(symbols)?;
        Ok(string)
    }

    pub fn layout(&self) -> PackedLayout {
        self.layout
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[W] {
        &self.words
    }

    pub(crate) fn words_mut(&mut self) -> &mut [W] {
        &mut self.words
    }

    /// Grows or shrinks to `len` symbols, new symbols are 0
    pub fn resize(&mut self, len: u64) {
        let symbols_per_word = self.layout.symbols_per_word::<W>();

        if len < self.len {
            for i in len..self.len.min(len.next_multiple_of(symbols_per_word)) {
                self.set_unchecked(i, 0);
            }
        }

        self.words
            .resize(len.div_ceil(symbols_per_word) as usize, W::zero());
        self.len = len;
    }

    pub fn push(&mut self, symbol: u8) -> LargeBwtResult<()> {
        self.check_symbol(symbol)?;
        let index = self.len;
        self.resize(index + 1);
        self.set_unchecked(index, symbol);
        Ok(())
    }

    pub fn extend_from_symbols(&mut self, symbols: &[u8]) -> LargeBwtResult<()> {
        for &symbol in symbols {
            self.check_symbol(symbol)?;
        }

        let begin = self.len;
        self.resize(begin + symbols.len() as u64);
        for (i, &symbol) in symbols.iter().enumerate() {
            self.set_unchecked(begin + i as u64, symbol);
        }

        Ok(())
    }

    #[inline]
    pub fn get(&self, index: u64) -> u8 {
        assert!(index < self.len, "index {} out of bounds", index);

        let symbols_per_word = self.layout.symbols_per_word::<W>();
        let word = self.words[(index / symbols_per_word) as usize];
        let shift = self.layout.shift::<W>(index % symbols_per_word);

        let symbol: u64 = ((word >> shift) & self.layout.symbol_mask::<W>()).as_();
        symbol as u8
    }

    pub fn set(&mut self, index: u64, symbol: u8) -> LargeBwtResult<()> {
        assert!(index < self.len, "index {} out of bounds", index);
        self.check_symbol(symbol)?;
        self.set_unchecked(index, symbol);
        Ok(())
    }

    /// Removes the symbol at `index`, shifting all following symbols left by one
    pub fn remove(&mut self, index: u64) -> u8 {
        let removed = self.get(index);

        for i in index + 1..self.len {
            let symbol = self.get(i);
            self.set_unchecked(i - 1, symbol);
        }

        self.resize(self.len - 1);
        removed
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = u8> + '_ {
        (0..self.len as usize).map(move |i| self.get(i as u64))
    }

    pub fn to_symbols(&self) -> Vec<u8> {
        self.iter().collect()
    }

    #[inline]
    fn set_unchecked(&mut self, index: u64, symbol: u8) {
        let symbols_per_word = self.layout.symbols_per_word::<W>();
        let shift = self.layout.shift::<W>(index % symbols_per_word);
        let word = &mut self.words[(index / symbols_per_word) as usize];

        *word = (*word & !(self.layout.symbol_mask::<W>() << shift))
            | (W::from_symbol(symbol) << shift);
    }

    fn check_symbol(&self, symbol: u8) -> LargeBwtResult<()> {
        if (symbol as usize) < self.layout.alphabet_size() {
            Ok(())
        } else {
            Err(LargeBwtError::InvalidInput(format!(
                "symbol {} does not fit into {} bits",
                symbol, self.layout.symbol_bits
            )))
        }
    }
}
