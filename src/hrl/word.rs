//! Hybrid run-length word format
//!
//! A content word is either a literal (its 64 bits are row presence bits)
//! or a fill (a run of identical all-0 or all-1 words). A parallel header
//! bit stream says which one each content word is.
//!
//! Fill layout:
//! - bit 63: fill value
//! - bits 58..=62: reserved, always zero
//! - bits 0..=57: run length in words (1..=MAX_FILL_LENGTH)

use crate::errors::{BitmapError, BitmapResult, ErrorContext};

/// Bits per content word (TIDs covered by one uncompressed word)
pub const WORD_BITS: u64 = 64;

/// Literal with no row present
pub const LITERAL_ALL_ZERO: u64 = 0;

/// Literal with every row present
pub const LITERAL_ALL_ONE: u64 = u64::MAX;

/// Fill value bit
pub const FILL_VALUE_BIT: u64 = 1 << 63;

/// Bits holding the run length of a fill
pub const FILL_LENGTH_BITS: u32 = 58;

/// Longest run a single fill word can encode
pub const MAX_FILL_LENGTH: u64 = (1 << FILL_LENGTH_BITS) - 1;

const FILL_RESERVED_MASK: u64 = !(FILL_VALUE_BIT | MAX_FILL_LENGTH);

/// One decoded content word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HrlWord {
    /// Row presence bits, least-significant bit first
    Literal(u64),
    /// `len` consecutive words that are all `bit`
    Fill { bit: bool, len: u64 },
}

impl HrlWord {
    /// Decodes a header bit / content word pair.
    ///
    /// Fails with a format error when a fill's run length is zero or does
    /// not fit the run-length field.
    pub fn decode(is_fill: bool, content: u64) -> BitmapResult<Self> {
        if !is_fill {
            return Ok(HrlWord::Literal(content));
        }
        if content & FILL_RESERVED_MASK != 0 {
            return Err(BitmapError::format(
                format!(
                    "fill word {:#018x} encodes a run longer than {} words",
                    content, MAX_FILL_LENGTH
                ),
                ErrorContext::none(),
            ));
        }
        let len = content & MAX_FILL_LENGTH;
        if len == 0 {
            return Err(BitmapError::format(
                format!("fill word {:#018x} encodes an empty run", content),
                ErrorContext::none(),
            ));
        }
        Ok(HrlWord::Fill {
            bit: content & FILL_VALUE_BIT != 0,
            len,
        })
    }

    /// Encodes to a header bit / content word pair.
    pub fn encode(&self) -> (bool, u64) {
        match *self {
            HrlWord::Literal(w) => (false, w),
            HrlWord::Fill { bit, len } => {
                let value = if bit { FILL_VALUE_BIT } else { 0 };
                (true, value | (len & MAX_FILL_LENGTH))
            }
        }
    }

    pub fn is_fill(&self) -> bool {
        matches!(self, HrlWord::Fill { .. })
    }

    /// Number of uncompressed words this word stands for
    pub fn word_len(&self) -> u64 {
        match *self {
            HrlWord::Literal(_) => 1,
            HrlWord::Fill { len, .. } => len,
        }
    }

    /// Number of TIDs this word covers
    pub fn bit_len(&self) -> u64 {
        self.word_len() * WORD_BITS
    }

    /// The repeated value if every covered bit is the same.
    pub fn uniform(&self) -> Option<bool> {
        match *self {
            HrlWord::Literal(LITERAL_ALL_ZERO) => Some(false),
            HrlWord::Literal(LITERAL_ALL_ONE) => Some(true),
            HrlWord::Literal(_) => None,
            HrlWord::Fill { bit, .. } => Some(bit),
        }
    }

    /// Uncompressed content of any one of the covered words
    pub fn expanded(&self) -> u64 {
        match *self {
            HrlWord::Literal(w) => w,
            HrlWord::Fill { bit: true, .. } => LITERAL_ALL_ONE,
            HrlWord::Fill { bit: false, .. } => LITERAL_ALL_ZERO,
        }
    }
}

/// Header bit stream: one bit per content word, 64 per header word,
/// most-significant bit first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBits {
    words: Vec<u64>,
    len: usize,
}

impl HeaderBits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds from stored header words covering `len` content words.
    pub fn from_raw(words: Vec<u64>, len: usize) -> BitmapResult<Self> {
        if words.len() != Self::header_words_for(len) {
            return Err(BitmapError::format(
                format!(
                    "{} header words cannot describe {} content words",
                    words.len(),
                    len
                ),
                ErrorContext::none(),
            ));
        }
        Ok(Self { words, len })
    }

    /// Header words needed for `len` content words
    pub fn header_words_for(len: usize) -> usize {
        (len + WORD_BITS as usize - 1) / WORD_BITS as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn raw(&self) -> &[u64] {
        &self.words
    }

    pub fn push(&mut self, is_fill: bool) {
        let n = self.len;
        if n % WORD_BITS as usize == 0 {
            self.words.push(0);
        }
        self.len += 1;
        self.set(n, is_fill);
    }

    pub fn get(&self, n: usize) -> bool {
        debug_assert!(n < self.len);
        let (word, mask) = Self::locate(n);
        self.words[word] & mask != 0
    }

    pub fn set(&mut self, n: usize, is_fill: bool) {
        debug_assert!(n < self.len);
        let (word, mask) = Self::locate(n);
        if is_fill {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    fn locate(n: usize) -> (usize, u64) {
        let word = n / WORD_BITS as usize;
        let shift = WORD_BITS as usize - 1 - n % WORD_BITS as usize;
        (word, 1u64 << shift)
    }
}

/// Splits decoded words into a header bit stream and content words.
pub fn encode_words(words: &[HrlWord]) -> (HeaderBits, Vec<u64>) {
    let mut headers = HeaderBits::new();
    let mut content = Vec::with_capacity(words.len());
    for word in words {
        let (is_fill, raw) = word.encode();
        headers.push(is_fill);
        content.push(raw);
    }
    (headers, content)
}

/// Decodes parallel header / content sequences, validating every fill.
pub fn decode_words(headers: &HeaderBits, content: &[u64]) -> BitmapResult<Vec<HrlWord>> {
    if headers.len() != content.len() {
        return Err(BitmapError::format(
            format!(
                "{} header bits for {} content words",
                headers.len(),
                content.len()
            ),
            ErrorContext::none(),
        ));
    }
    content
        .iter()
        .enumerate()
        .map(|(n, &raw)| HrlWord::decode(headers.get(n), raw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_passthrough() {
        let word = HrlWord::decode(false, 0b1011).unwrap();
        assert_eq!(word, HrlWord::Literal(0b1011));
        assert_eq!(word.encode(), (false, 0b1011));
        assert_eq!(word.word_len(), 1);
    }

    #[test]
    fn test_fill_encoding() {
        let ones = HrlWord::Fill { bit: true, len: 5 };
        let (is_fill, raw) = ones.encode();
        assert!(is_fill);
        assert_eq!(raw, FILL_VALUE_BIT | 5);
        assert_eq!(HrlWord::decode(true, raw).unwrap(), ones);

        let zeros = HrlWord::Fill { bit: false, len: MAX_FILL_LENGTH };
        let (_, raw) = zeros.encode();
        assert_eq!(HrlWord::decode(true, raw).unwrap(), zeros);
        assert_eq!(zeros.bit_len(), MAX_FILL_LENGTH * 64);
    }

    #[test]
    fn test_decode_rejects_empty_run() {
        let err = HrlWord::decode(true, FILL_VALUE_BIT).unwrap_err();
        assert_eq!(err.code(), "AERO_BITMAP_FORMAT");
        assert!(HrlWord::decode(true, 0).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_run() {
        let raw = (1u64 << FILL_LENGTH_BITS) | 3;
        let err = HrlWord::decode(true, raw).unwrap_err();
        assert!(err.to_string().contains("longer than"));
    }

    #[test]
    fn test_uniform_detection() {
        assert_eq!(HrlWord::Literal(0).uniform(), Some(false));
        assert_eq!(HrlWord::Literal(u64::MAX).uniform(), Some(true));
        assert_eq!(HrlWord::Literal(1).uniform(), None);
        assert_eq!(HrlWord::Fill { bit: true, len: 2 }.uniform(), Some(true));
    }

    #[test]
    fn test_header_bits_msb_first() {
        let mut headers = HeaderBits::new();
        headers.push(true);
        headers.push(false);
        headers.push(true);
        assert_eq!(headers.raw(), &[0b101u64 << 61]);
        assert!(headers.get(0));
        assert!(!headers.get(1));
        assert!(headers.get(2));

        for _ in 0..64 {
            headers.push(false);
        }
        assert_eq!(headers.len(), 67);
        assert_eq!(headers.raw().len(), 2);
    }

    #[test]
    fn test_header_from_raw_checks_length() {
        assert!(HeaderBits::from_raw(vec![0], 64).is_ok());
        assert!(HeaderBits::from_raw(vec![0], 65).is_err());
        assert!(HeaderBits::from_raw(vec![], 0).is_ok());
    }

    #[test]
    fn test_encode_decode_words() {
        let words = vec![
            HrlWord::Literal(7),
            HrlWord::Fill { bit: false, len: 10 },
            HrlWord::Fill { bit: true, len: 2 },
            HrlWord::Literal(1 << 40),
        ];
        let (headers, content) = encode_words(&words);
        assert_eq!(decode_words(&headers, &content).unwrap(), words);
    }
}
