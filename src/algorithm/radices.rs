use std::cmp::Ordering;

use crate::string_set::{StringSet, SuffixCoord};

/// Low bits of every radix that hold the number of symbols left before the
/// terminator, or `DOLLAR_MASK` if the radix is completely filled
pub const DOLLAR_BITS: u32 = 4;
pub const DOLLAR_MASK: u32 = (1 << DOLLAR_BITS) - 1;

pub const WORD_BITS: u32 = 32;

/// Marks the terminator in unpacked BWT output
pub const DOLLAR_SYMBOL: u8 = 255;

pub fn symbols_per_word(symbol_bits: u32) -> u32 {
    (WORD_BITS - DOLLAR_BITS) / symbol_bits
}

pub fn bucket_prefix_symbols(bucketing_bits: u32, symbol_bits: u32) -> u32 {
    (bucketing_bits - DOLLAR_BITS) / symbol_bits
}

/// A bucket holds suffixes shorter than the bucket prefix iff its dollar field
/// is not saturated
#[inline]
pub fn is_short_bucket(bucket: u32) -> bool {
    bucket & DOLLAR_MASK != DOLLAR_MASK
}

/// Packs `num_symbols` symbols of the suffix at `coord`, starting `start`
/// symbols in, MSB first, followed by the dollar field.
///
/// Symbols past the end of the string are 0, so a suffix that ends inside the
/// radix sorts before every longer suffix sharing its prefix.
#[inline]
pub fn suffix_radix<S: StringSet>(
    string_set: &S,
    coord: SuffixCoord,
    start: u64,
    num_symbols: u32,
    symbol_bits: u32,
) -> u32 {
    let string_len = string_set.string_len(coord.string_id) as u64;
    let begin = coord.offset as u64 + start;
    let available = string_len.saturating_sub(begin);

    let mut radix = 0u32;
    for j in 0..num_symbols as u64 {
        radix <<= symbol_bits;
        if j < available {
            radix |= string_set.symbol(coord.string_id, (begin + j) as u32) as u32;
        }
    }

    let dollar = if available >= num_symbols as u64 {
        DOLLAR_MASK
    } else {
        available as u32
    };

    (radix << DOLLAR_BITS) | dollar
}

#[inline]
pub fn bucket_key<S: StringSet>(
    string_set: &S,
    coord: SuffixCoord,
    bucketing_bits: u32,
    symbol_bits: u32,
) -> u32 {
    suffix_radix(
        string_set,
        coord,
        0,
        bucket_prefix_symbols(bucketing_bits, symbol_bits),
        symbol_bits,
    )
}

/// Word `word` of the sort key of the suffix at `coord`
#[inline]
pub fn suffix_word<S: StringSet>(
    string_set: &S,
    coord: SuffixCoord,
    word: u32,
    symbol_bits: u32,
) -> u32 {
    let symbols_per_word = symbols_per_word(symbol_bits);

    suffix_radix(
        string_set,
        coord,
        word as u64 * symbols_per_word as u64,
        symbols_per_word,
        symbol_bits,
    )
}

/// Number of sort words needed to tell apart any two suffixes of at most
/// `max_suffix_len` symbols
pub fn words_for_len(max_suffix_len: u32, symbol_bits: u32) -> u32 {
    max_suffix_len.div_ceil(symbols_per_word(symbol_bits)).max(1)
}

/// The symbol preceding the suffix, the terminator for whole strings
#[inline]
pub fn bwt_symbol<S: StringSet>(string_set: &S, coord: SuffixCoord) -> u8 {
    if coord.offset == 0 {
        DOLLAR_SYMBOL
    } else {
        string_set.symbol(coord.string_id, coord.offset - 1)
    }
}

/// Full comparison of two suffixes, terminators ordered by string id
pub fn compare_suffixes<S: StringSet>(string_set: &S, a: SuffixCoord, b: SuffixCoord) -> Ordering {
    let symbol_bits = string_set.symbol_bits();
    let len_a = string_set.string_len(a.string_id) - a.offset;
    let len_b = string_set.string_len(b.string_id) - b.offset;
    let num_words = words_for_len(len_a.max(len_b), symbol_bits);

    for word in 0..num_words {
        let ordering = suffix_word(string_set, a, word, symbol_bits)
            .cmp(&suffix_word(string_set, b, word, symbol_bits));

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.string_id.cmp(&b.string_id)
}
