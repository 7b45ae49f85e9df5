//! LOV item: per-key descriptor of a bitmap vector
//!
//! The vector's content is, in order: the words on its chain of bitmap
//! pages, then `last_compword`, then the partially filled `last_word`.
//! The two trailing words live here rather than on a page because later
//! inserts may still change them.

use std::fmt;
use std::io::{self, Read, Write};

use crate::hrl::{HrlWord, WORD_BITS};
use crate::page::{read_page_ref, write_page_ref, PageId};
use crate::tid::Tid;

/// Address of a LOV entry: LOV page and slot within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LovLocation {
    pub page: PageId,
    pub offset: u16,
}

impl LovLocation {
    pub fn new(page: PageId, offset: u16) -> Self {
        Self { page, offset }
    }
}

impl fmt::Display for LovLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page, self.offset)
    }
}

const HAS_COMPWORD: u8 = 0b01;
const COMPWORD_IS_FILL: u8 = 0b10;

/// Descriptor of one bitmap vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LovItem {
    /// First TID ever set in this vector, 0 while empty
    pub start_tid: Tid,
    /// First bitmap page of the chain
    pub head_page: Option<PageId>,
    /// Last bitmap page of the chain
    pub tail_page: Option<PageId>,
    /// Most recent complete word, not yet on a page
    pub last_compword: Option<HrlWord>,
    /// In-progress literal word at index `words_covered`
    pub last_word: u64,
    /// Highest TID set
    pub last_setbit: Tid,
    /// Uncompressed words on pages plus `last_compword`
    pub words_covered: u64,
    /// Uncompressed words on pages
    pub page_words: u64,
}

impl LovItem {
    /// Serialized size in bytes
    pub const ENCODED_LEN: usize = 8 + 4 + 4 + 1 + 8 + 8 + 8 + 8 + 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.last_setbit == 0
    }

    /// Highest TID the vector describes, partial word included
    pub fn covered_tids(&self) -> Tid {
        (self.words_covered + 1) * WORD_BITS
    }

    /// The two trailing words as they are read after the page chain.
    pub fn tail_words(&self) -> Vec<HrlWord> {
        let mut words = Vec::with_capacity(2);
        if let Some(word) = self.last_compword {
            words.push(word);
        }
        if self.last_word != 0 {
            words.push(HrlWord::Literal(self.last_word));
        }
        words
    }

    /// Format (all integers LE):
    /// start_tid u64 | head u32 | tail u32 | flags u8 | compword u64 |
    /// last_word u64 | last_setbit u64 | words_covered u64 | page_words u64
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.start_tid.to_le_bytes())?;
        write_page_ref(writer, self.head_page)?;
        write_page_ref(writer, self.tail_page)?;
        let (flags, raw) = match self.last_compword {
            None => (0, 0),
            Some(word) => {
                let (is_fill, raw) = word.encode();
                let flags = HAS_COMPWORD | if is_fill { COMPWORD_IS_FILL } else { 0 };
                (flags, raw)
            }
        };
        writer.write_all(&[flags])?;
        writer.write_all(&raw.to_le_bytes())?;
        writer.write_all(&self.last_word.to_le_bytes())?;
        writer.write_all(&self.last_setbit.to_le_bytes())?;
        writer.write_all(&self.words_covered.to_le_bytes())?;
        writer.write_all(&self.page_words.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let start_tid = read_u64(reader)?;
        let head_page = read_page_ref(reader)?;
        let tail_page = read_page_ref(reader)?;
        let mut flags = [0u8; 1];
        reader.read_exact(&mut flags)?;
        let raw = read_u64(reader)?;
        let last_compword = if flags[0] & HAS_COMPWORD != 0 {
            let word = HrlWord::decode(flags[0] & COMPWORD_IS_FILL != 0, raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            Some(word)
        } else {
            None
        };
        Ok(Self {
            start_tid,
            head_page,
            tail_page,
            last_compword,
            last_word: read_u64(reader)?,
            last_setbit: read_u64(reader)?,
            words_covered: read_u64(reader)?,
            page_words: read_u64(reader)?,
        })
    }
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_empty() {
        let item = LovItem::new();
        assert!(item.is_empty());
        assert!(item.tail_words().is_empty());
        assert_eq!(item.covered_tids(), 64);
    }

    #[test]
    fn test_encoding_preserves_tail() {
        let item = LovItem {
            start_tid: 3,
            head_page: Some(4),
            tail_page: Some(9),
            last_compword: Some(HrlWord::Fill { bit: false, len: 77 }),
            last_word: 0b1001,
            last_setbit: 5000,
            words_covered: 78,
            page_words: 1,
        };
        let mut buf = Vec::new();
        item.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), LovItem::ENCODED_LEN);
        let decoded = LovItem::read_from(&mut io::Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, item);
        assert_eq!(
            decoded.tail_words(),
            vec![HrlWord::Fill { bit: false, len: 77 }, HrlWord::Literal(0b1001)]
        );
    }

    #[test]
    fn test_corrupt_compword_rejected() {
        let item = LovItem {
            last_compword: Some(HrlWord::Fill { bit: true, len: 2 }),
            ..LovItem::new()
        };
        let mut buf = Vec::new();
        item.write_to(&mut buf).unwrap();
        // compword raw starts after start_tid, head, tail and flags
        let at = 8 + 4 + 4 + 1;
        buf[at..at + 8].copy_from_slice(&(1u64 << 63).to_le_bytes());
        assert!(LovItem::read_from(&mut io::Cursor::new(&buf)).is_err());
    }
}
