//! Cell word encodings.
//!
//! Every link-related cell is one 64-bit word in its column's leaf array:
//!
//! * forward link cell: `0` is null, otherwise the target row plus one;
//! * backlink cell: `0` is empty, low bit set is a tagged inline origin row
//!   (`origin << 1 | 1`), any other even value is a store ref;
//! * link-list cell: `0` is the degenerate empty list, otherwise a store ref.
//!
//! The arena only hands out even, nonzero refs, which is what makes the low
//! bit available as the inline discriminator.

use crate::error::{LinkError, Result};
use crate::types::RowNdx;

use super::arena::StoreRef;

/// Decoded representation of one backlink cell word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BacklinkCell {
    Empty,
    Inline(RowNdx),
    Store(StoreRef),
}

impl BacklinkCell {
    pub fn from_word(word: u64) -> Self {
        if word == 0 {
            BacklinkCell::Empty
        } else if word & 1 != 0 {
            BacklinkCell::Inline((word >> 1) as RowNdx)
        } else {
            BacklinkCell::Store(word)
        }
    }

    pub fn word(self) -> u64 {
        match self {
            BacklinkCell::Empty => 0,
            BacklinkCell::Inline(origin) => ((origin as u64) << 1) | 1,
            BacklinkCell::Store(r) => r,
        }
    }
}

/// Decodes a link-list cell word into its optional store ref.
pub fn list_cell_ref(word: u64) -> Result<Option<StoreRef>> {
    if word == 0 {
        Ok(None)
    } else if word & 1 != 0 {
        Err(LinkError::InvariantViolation("link-list cell word is odd"))
    } else {
        Ok(Some(word))
    }
}

/// Encodes an optional forward target with the one-shifted null discipline.
pub fn link_word(target: Option<RowNdx>) -> u64 {
    match target {
        None => 0,
        Some(row) => row as u64 + 1,
    }
}

/// Decodes a one-shifted forward cell word.
pub fn link_target(word: u64) -> Option<RowNdx> {
    if word == 0 {
        None
    } else {
        Some((word - 1) as RowNdx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlink_words_round_trip() {
        for cell in [
            BacklinkCell::Empty,
            BacklinkCell::Inline(0),
            BacklinkCell::Inline(41),
            BacklinkCell::Store(2),
            BacklinkCell::Store(40),
        ] {
            assert_eq!(BacklinkCell::from_word(cell.word()), cell);
        }
    }

    #[test]
    fn inline_tag_sets_low_bit() {
        assert_eq!(BacklinkCell::Inline(5).word(), 11);
        assert_eq!(BacklinkCell::from_word(11), BacklinkCell::Inline(5));
    }

    #[test]
    fn link_words_are_one_shifted() {
        assert_eq!(link_word(None), 0);
        assert_eq!(link_word(Some(0)), 1);
        assert_eq!(link_target(1), Some(0));
        assert_eq!(link_target(0), None);
    }

    #[test]
    fn odd_list_cell_word_is_rejected() {
        assert!(list_cell_ref(3).is_err());
        assert_eq!(list_cell_ref(0).unwrap(), None);
        assert_eq!(list_cell_ref(4).unwrap(), Some(4));
    }
}
