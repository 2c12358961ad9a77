//! Hollerith keyword hashing.
//!
//! Keywords are bucketed the way the 7094 did it: the last six characters of
//! the space-padded token are packed into a 36-bit word using the six-bit
//! Hollerith character code, the word is squared, and the middle bits of the
//! product are taken as the bucket number.
//!
//! # Determinism
//! The hash depends only on the token's characters (case-folded) and the
//! requested width. The bucket layout of a loaded script is therefore stable
//! across runs and platforms.

use thiserror::Error;

/// Bucket width used for the keyword index (32 buckets).
pub const BUCKET_BITS: u32 = 5;

/// Width used to pick one of the four memory rules.
pub const MEMORY_BITS: u32 = 2;

/// Largest accepted hash width.
pub const MAX_BITS: u32 = 15;

const WORD_CHARS: usize = 6;
const WORD_MASK: u64 = 0o377_777_777_777;

/// Errors raised while hashing a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The token holds a character with no Hollerith code.
    #[error("token {token:?} contains {character:?}, which has no Hollerith code")]
    UnknownCharacter {
        /// Token being hashed.
        token: String,
        /// First offending character.
        character: char,
    },
    /// Requested width is outside `0..=15`.
    #[error("hash width {0} is out of range (0..=15)")]
    WidthOutOfRange(u32),
}

/// Six-bit Hollerith code of `c`, case-folded. `None` if it has none.
pub fn hollerith(c: char) -> Option<u8> {
    let c = c.to_ascii_uppercase();
    let code = match c {
        '0'..='7' => c as u8 - b'0',
        '8' => 0o10,
        '9' => 0o11,
        '=' => 0o13,
        '\'' | '"' => 0o14,
        '+' => 0o20,
        'A'..='I' => 0o21 + (c as u8 - b'A'),
        '.' => 0o33,
        ')' => 0o34,
        '-' => 0o40,
        'J'..='R' => 0o41 + (c as u8 - b'J'),
        '$' => 0o53,
        '*' => 0o54,
        ' ' => 0o60,
        '/' => 0o61,
        'S'..='Z' => 0o62 + (c as u8 - b'S'),
        '#' => 0o72,
        ',' => 0o73,
        '(' => 0o74,
        _ => return None,
    };
    Some(code)
}

/// Packs the last six characters of the space-padded token into a word.
///
/// The token is right-padded with spaces to a multiple of six characters;
/// an empty token packs as six spaces.
pub fn encode(token: &str) -> Result<u64, HashError> {
    let mut chars: Vec<char> = token.chars().collect();
    let padded = chars.len().div_ceil(WORD_CHARS).max(1) * WORD_CHARS;
    chars.resize(padded, ' ');

    let mut word: u64 = 0;
    for &c in &chars[padded - WORD_CHARS..] {
        let code = hollerith(c).ok_or_else(|| HashError::UnknownCharacter {
            token: token.to_owned(),
            character: c,
        })?;
        word = (word << 6) | u64::from(code);
    }
    Ok(word & WORD_MASK)
}

/// Middle-square hash of a packed word, `bits` wide.
pub fn hash_word(word: u64, bits: u32) -> Result<usize, HashError> {
    if bits > MAX_BITS {
        return Err(HashError::WidthOutOfRange(bits));
    }
    let squared = word.wrapping_mul(word);
    let shifted = squared >> (35 - bits / 2);
    Ok((shifted & ((1u64 << bits) - 1)) as usize)
}

/// Hash of `token` into `0..2^bits`.
pub fn hash(token: &str, bits: u32) -> Result<usize, HashError> {
    hash_word(encode(token)?, bits)
}
