//! Reconstruction of the input from its BWT

use crate::algorithm::radices::DOLLAR_SYMBOL;
use crate::error::{LargeBwtError, LargeBwtResult};
use crate::rank_dictionary::RankDictionary;

const RANK_INTERVAL: u64 = 64;

/// Inverts the BWT of a single string, `bwt` not containing the terminator
/// that was removed at `primary`
pub fn invert_string_bwt(bwt: &[u8], primary: u64, symbol_bits: u32) -> LargeBwtResult<Vec<u8>> {
    if primary > bwt.len() as u64 {
        return Err(LargeBwtError::InvalidInput(format!(
            "primary {} is past the end of a BWT of length {}",
            primary,
            bwt.len()
        )));
    }

    let mut full = Vec::with_capacity(bwt.len() + 1);
    full.extend_from_slice(&bwt[..primary as usize]);
    full.push(DOLLAR_SYMBOL);
    full.extend_from_slice(&bwt[primary as usize..]);

    let mut strings = invert_string_set_bwt(&full, 1, symbol_bits)?;
    Ok(strings.pop().unwrap_or_default())
}

/// Inverts the BWT of a string set, which starts with the rows of the
/// `num_strings` terminators
pub fn invert_string_set_bwt(
    bwt: &[u8],
    num_strings: u32,
    symbol_bits: u32,
) -> LargeBwtResult<Vec<Vec<u8>>> {
    let dictionary = RankDictionary::new(bwt, symbol_bits, RANK_INTERVAL)?;

    if dictionary.num_dollars() != num_strings as u64 {
        return Err(LargeBwtError::InvalidInput(format!(
            "BWT holds {} terminators for {} strings",
            dictionary.num_dollars(),
            num_strings
        )));
    }

    let mut strings = Vec::with_capacity(num_strings as usize);

    for string_id in 0..num_strings as u64 {
        let mut string = Vec::new();
        let mut row = string_id;

        while let Some(next_row) = dictionary.lf(row) {
            if string.len() as u64 >= dictionary.len() {
                return Err(LargeBwtError::InvalidInput(
                    "BWT does not describe a string set".into(),
                ));
            }

            string.push(dictionary.symbol(row));
            row = next_row;
        }

        string.reverse();
        strings.push(string);
    }

    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_banana() {
        // a = 0, b = 1, n = 2
        let banana: [u8; 6] = [1, 0, 2, 0, 2, 0];
        assert_eq!(invert_string_bwt(&[0, 2, 2, 1, 0, 0], 4, 2).unwrap(), banana);
    }

    #[test]
    fn test_invert_string_set() {
        // {ab, "", ba}: rows $0 $1 $2 a$2 ab$0 b$0 ba$2
        let bwt = [1, DOLLAR_SYMBOL, 0, 1, DOLLAR_SYMBOL, 0, DOLLAR_SYMBOL];

        let strings = invert_string_set_bwt(&bwt, 3, 2).unwrap();
        assert_eq!(strings, [vec![0, 1], vec![], vec![1, 0]]);

        assert!(invert_string_set_bwt(&bwt, 2, 2).is_err());
    }

    #[test]
    fn test_invert_rejects_bad_primary() {
        assert!(invert_string_bwt(&[0, 1], 3, 2).is_err());
    }
}
