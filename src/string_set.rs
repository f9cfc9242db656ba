//! String-set views consumed by the suffix sorter

use crate::error::{LargeBwtError, LargeBwtResult};
use crate::packed::{PackedLayout, PackedString, PackedWord};

/// Identifies the suffix of string `string_id` starting at `offset`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SuffixCoord {
    pub string_id: u32,
    pub offset: u32,
}

impl SuffixCoord {
    pub fn new(string_id: u32, offset: u32) -> Self {
        Self { string_id, offset }
    }
}

/// Read-only random access to an ordered collection of symbol strings.
///
/// Every string ends in an implicit terminator that is smaller than any
/// symbol, terminators of different strings are ordered by string id.
pub trait StringSet: Sync {
    fn symbol_bits(&self) -> u32;

    fn num_strings(&self) -> u32;

    fn string_len(&self, string_id: u32) -> u32;

    fn symbol(&self, string_id: u32, offset: u32) -> u8;

    fn max_string_len(&self) -> u32 {
        (0..self.num_strings())
            .map(|string_id| self.string_len(string_id))
            .max()
            .unwrap_or(0)
    }

    /// Number of non-empty suffixes
    fn num_suffixes(&self) -> u64 {
        (0..self.num_strings())
            .map(|string_id| self.string_len(string_id) as u64)
            .sum()
    }
}

/// Strings stored back to back in one packed buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStringSet<W: PackedWord = u32> {
    symbols: PackedString<W>,
    offsets: Vec<u64>,
}

impl<W: PackedWord> PackedStringSet<W> {
    pub fn new(layout: PackedLayout) -> Self {
        Self {
            symbols: PackedString::new(layout),
            offsets: vec![0],
        }
    }

    pub fn from_strings<'a>(
        layout: PackedLayout,
        strings: impl IntoIterator<Item = &'a [u8]>,
    ) -> LargeBwtResult<Self> {
        let mut set = Self::new(layout);

        for string in strings {
            set.push_string(string)?;
        }

        Ok(set)
    }

    pub fn push_string(&mut self, string: &[u8]) -> LargeBwtResult<()> {
        if self.offsets.len() > u32::MAX as usize {
            return Err(LargeBwtError::InvalidInput(
                "a string set holds at most u32::MAX strings".into(),
            ));
        }

        if string.len() >= u32::MAX as usize {
            return Err(LargeBwtError::InvalidInput(format!(
                "string of length {} is too long",
                string.len()
            )));
        }

        self.symbols.extend_from_symbols(string)?;
        self.offsets.push(self.symbols.len());

        Ok(())
    }

    pub fn layout(&self) -> PackedLayout {
        self.symbols.layout()
    }

    pub fn total_symbols(&self) -> u64 {
        self.symbols.len()
    }

    pub fn string(&self, string_id: u32) -> impl Iterator<Item = u8> + '_ {
        let begin = self.offsets[string_id as usize];
        let end = self.offsets[string_id as usize + 1];

        (begin..end).map(move |i| self.symbols.get(i))
    }
}

impl<W: PackedWord> StringSet for PackedStringSet<W> {
    fn symbol_bits(&self) -> u32 {
        self.symbols.layout().symbol_bits()
    }

    fn num_strings(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    #[inline]
    fn string_len(&self, string_id: u32) -> u32 {
        let id = string_id as usize;
        (self.offsets[id + 1] - self.offsets[id]) as u32
    }

    #[inline]
    fn symbol(&self, string_id: u32, offset: u32) -> u8 {
        self.symbols
            .get(self.offsets[string_id as usize] + offset as u64)
    }

    fn num_suffixes(&self) -> u64 {
        self.symbols.len()
    }
}

/// A single packed string seen as a string set with one member
#[derive(Debug, Clone, Copy)]
pub struct SingleString<'a, W: PackedWord = u32> {
    string: &'a PackedString<W>,
}

impl<'a, W: PackedWord> SingleString<'a, W> {
    pub fn new(string: &'a PackedString<W>) -> LargeBwtResult<Self> {
        if string.len() >= u32::MAX as u64 {
            return Err(LargeBwtError::InvalidInput(format!(
                "string of length {} is too long",
                string.len()
            )));
        }

        Ok(Self { string })
    }
}

impl<W: PackedWord> StringSet for SingleString<'_, W> {
    fn symbol_bits(&self) -> u32 {
        self.string.layout().symbol_bits()
    }

    fn num_strings(&self) -> u32 {
        1
    }

    #[inline]
    fn string_len(&self, _string_id: u32) -> u32 {
        self.string.len() as u32
    }

    #[inline]
    fn symbol(&self, _string_id: u32, offset: u32) -> u8 {
        self.string.get(offset as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_string_set_access() {
        let layout = PackedLayout::new(2, false).unwrap();
        let strings: [&[u8]; 3] = [&[0, 1, 2], &[], &[3, 3]];
        let set = PackedStringSet::<u32>::from_strings(layout, strings).unwrap();

        assert_eq!(set.num_strings(), 3);
        assert_eq!(set.string_len(1), 0);
        assert_eq!(set.symbol(2, 1), 3);
        assert_eq!(set.max_string_len(), 3);
        assert_eq!(set.num_suffixes(), 5);
        assert_eq!(set.string(0).collect::<Vec<_>>(), [0, 1, 2]);
    }
}
