//! # Bit Packing
//!
//! Stateless helpers for fixed-layout framing: pack integers of unequal bit widths
//! into a contiguous MSB-first stream of 32-bit words, read them back, and convert
//! between words and big-endian bytes.
//!
//! Field widths are not validated against the destination size. Callers declare
//! layouts whose widths fit the word count they ask for; bits that fall past the
//! last word are discarded.

const WORD_BITS: usize = 32;

#[inline]
fn low_mask(bits: usize) -> u32 {
    if bits >= WORD_BITS {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Pack `values` into `word_count` words, each value truncated to its width in `widths`.
///
/// Values are laid out back to back starting at the most significant bit of the
/// first word and may straddle word boundaries. Widths above 32 are treated as 32.
pub fn pack_bits(word_count: usize, values: &[u32], widths: &[u32]) -> Vec<u32> {
    let mut words = vec![0u32; word_count];
    let mut pos = 0usize;

    for (&value, &width) in values.iter().zip(widths) {
        let width = (width as usize).min(WORD_BITS);
        let field = value & low_mask(width);
        let mut remaining = width;

        while remaining > 0 {
            let index = pos / WORD_BITS;
            if index >= words.len() {
                return words;
            }
            let room = WORD_BITS - pos % WORD_BITS;
            let take = remaining.min(room);
            let chunk = (field >> (remaining - take)) & low_mask(take);
            words[index] |= chunk << (room - take);

            pos += take;
            remaining -= take;
        }
    }

    words
}

/// Inverse of [`pack_bits`]. Bits past the end of `words` read as zero.
pub fn unpack_bits(words: &[u32], widths: &[u32]) -> Vec<u32> {
    let mut pos = 0usize;

    widths
        .iter()
        .map(|&width| {
            let width = (width as usize).min(WORD_BITS);
            let mut value = 0u32;
            let mut remaining = width;

            while remaining > 0 {
                let room = WORD_BITS - pos % WORD_BITS;
                let take = remaining.min(room);
                let word = words.get(pos / WORD_BITS).copied().unwrap_or(0);
                let chunk = (word >> (room - take)) & low_mask(take);
                // `take` can be 32 only when value is still empty
                value = if take == WORD_BITS { chunk } else { (value << take) | chunk };

                pos += take;
                remaining -= take;
            }
            value
        })
        .collect()
}

/// Read `length` bits starting `offset` bits below the MSB of `word`.
///
/// Returns `None` when the selection runs past the end of the word.
pub fn select_bits(word: u32, offset: u32, length: u32) -> Option<u32> {
    let (offset, length) = (offset as usize, length as usize);
    if offset + length > WORD_BITS {
        return None;
    }
    if length == 0 {
        return Some(0);
    }
    Some((word >> (WORD_BITS - offset - length)) & low_mask(length))
}

/// Split a word into its big-endian bytes.
#[inline]
pub fn split_word(word: u32) -> [u8; 4] {
    word.to_be_bytes()
}

/// Split a run of words into big-endian bytes.
pub fn split_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Merge four big-endian bytes into a word.
#[inline]
pub fn merge_word(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Merge bytes into words. A short tail is padded with zero bytes.
pub fn merge_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut padded = [0u8; 4];
            padded[..chunk.len()].copy_from_slice(chunk);
            merge_word(padded)
        })
        .collect()
}
