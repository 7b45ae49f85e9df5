//! WAL record types and structures
//!
//! Each WAL record contains:
//! - Record Length (u32 LE)
//! - Record Type (u8)
//! - Sequence Number (u64 LE)
//! - Payload (variable)
//! - Checksum (u32 LE)
//!
//! Payloads carry after-images only (full pages, full LOV entries, the
//! complete tail state), so applying a record twice leaves the same state
//! as applying it once.

use std::io::{self, Cursor, Read, Write};

use crate::hrl::HrlWord;
use crate::lov::{LovItem, LovLocation};
use crate::page::{compute_checksum, BitmapPage, LovEntry, MetaPage, PageId};
use crate::tid::Tid;

/// WAL record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Full metapage image
    MetapageUpdate = 1,
    /// One LOV entry, possibly on a newly chained LOV page
    LovItemUpdate = 2,
    /// Bulk flush of words onto bitmap pages
    BitmapWords = 3,
    /// Patch of one word on a bitmap page
    UpdateWord = 4,
    /// Tail state of a vector kept in its LOV entry
    LastWords = 5,
    /// Split of a fill word in place, with optional spill page
    UpdateWords = 6,
}

impl RecordType {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::MetapageUpdate),
            2 => Some(RecordType::LovItemUpdate),
            3 => Some(RecordType::BitmapWords),
            4 => Some(RecordType::UpdateWord),
            5 => Some(RecordType::LastWords),
            6 => Some(RecordType::UpdateWords),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::MetapageUpdate => "metapage_update",
            RecordType::LovItemUpdate => "lov_item_update",
            RecordType::BitmapWords => "bitmap_words",
            RecordType::UpdateWord => "update_word",
            RecordType::LastWords => "last_words",
            RecordType::UpdateWords => "update_words",
        }
    }
}

/// New or changed LOV entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LovItemUpdate {
    pub location: LovLocation,
    pub entry: LovEntry,
    /// The LOV page is fresh and must be initialised before the entry lands
    pub new_lov_page: bool,
    /// LOV page whose forward pointer must now reach `location.page`
    pub prev_lov_page: Option<PageId>,
    /// Metapage after-image when the LOV chain or count changed
    pub meta: Option<MetaPage>,
}

/// Words flushed from a build buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapWordsUpdate {
    pub location: LovLocation,
    pub item: LovItem,
    /// After-images of every bitmap page touched, previous tail included
    pub pages: Vec<(PageId, BitmapPage)>,
    /// The first page of the vector's chain was created by this flush
    pub init_first_page: bool,
}

/// One word patched on a bitmap page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWordPatch {
    pub page: PageId,
    pub word_no: u32,
    pub word: HrlWord,
}

/// Mutable tail of a vector as stored in its LOV item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailState {
    pub start_tid: Tid,
    pub last_compword: Option<HrlWord>,
    pub last_word: u64,
    pub last_setbit: Tid,
    pub words_covered: u64,
}

impl TailState {
    pub fn of(item: &LovItem) -> Self {
        Self {
            start_tid: item.start_tid,
            last_compword: item.last_compword,
            last_word: item.last_word,
            last_setbit: item.last_setbit,
            words_covered: item.words_covered,
        }
    }

    pub fn apply_to(&self, item: &mut LovItem) {
        item.start_tid = self.start_tid;
        item.last_compword = self.last_compword;
        item.last_word = self.last_word;
        item.last_setbit = self.last_setbit;
        item.words_covered = self.words_covered;
    }
}

/// Tail words changed without touching any bitmap page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWordsUpdate {
    pub location: LovLocation,
    pub tail: TailState,
}

/// A fill word split in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWordsSplit {
    pub location: LovLocation,
    /// The split page, then the newly chained spill page if any
    pub pages: Vec<(PageId, BitmapPage)>,
    /// LOV item after-image when the vector's tail page changed
    pub item: Option<LovItem>,
    pub new_last_page: bool,
}

/// Record payload, one variant per record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalPayload {
    MetapageUpdate(MetaPage),
    LovItemUpdate(LovItemUpdate),
    BitmapWords(BitmapWordsUpdate),
    UpdateWord(UpdateWordPatch),
    LastWords(LastWordsUpdate),
    UpdateWords(UpdateWordsSplit),
}

impl WalPayload {
    pub fn record_type(&self) -> RecordType {
        match self {
            WalPayload::MetapageUpdate(_) => RecordType::MetapageUpdate,
            WalPayload::LovItemUpdate(_) => RecordType::LovItemUpdate,
            WalPayload::BitmapWords(_) => RecordType::BitmapWords,
            WalPayload::UpdateWord(_) => RecordType::UpdateWord,
            WalPayload::LastWords(_) => RecordType::LastWords,
            WalPayload::UpdateWords(_) => RecordType::UpdateWords,
        }
    }

    /// Write payload to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            WalPayload::MetapageUpdate(meta) => meta.write_to(writer),
            WalPayload::LovItemUpdate(u) => {
                write_location(writer, u.location)?;
                u.entry.write_to(writer)?;
                writer.write_all(&[u.new_lov_page as u8])?;
                write_opt_page(writer, u.prev_lov_page)?;
                match &u.meta {
                    Some(meta) => {
                        writer.write_all(&[1])?;
                        meta.write_to(writer)
                    }
                    None => writer.write_all(&[0]),
                }
            }
            WalPayload::BitmapWords(u) => {
                write_location(writer, u.location)?;
                u.item.write_to(writer)?;
                write_pages(writer, &u.pages)?;
                writer.write_all(&[u.init_first_page as u8])
            }
            WalPayload::UpdateWord(u) => {
                writer.write_all(&u.page.to_le_bytes())?;
                writer.write_all(&u.word_no.to_le_bytes())?;
                write_word(writer, Some(u.word))
            }
            WalPayload::LastWords(u) => {
                write_location(writer, u.location)?;
                writer.write_all(&u.tail.start_tid.to_le_bytes())?;
                write_word(writer, u.tail.last_compword)?;
                writer.write_all(&u.tail.last_word.to_le_bytes())?;
                writer.write_all(&u.tail.last_setbit.to_le_bytes())?;
                writer.write_all(&u.tail.words_covered.to_le_bytes())
            }
            WalPayload::UpdateWords(u) => {
                write_location(writer, u.location)?;
                write_pages(writer, &u.pages)?;
                match &u.item {
                    Some(item) => {
                        writer.write_all(&[1])?;
                        item.write_to(writer)?;
                    }
                    None => writer.write_all(&[0])?,
                }
                writer.write_all(&[u.new_last_page as u8])
            }
        }
    }

    /// Read a payload of the given type from a reader
    pub fn read_from<R: Read>(record_type: RecordType, reader: &mut R) -> io::Result<Self> {
        Ok(match record_type {
            RecordType::MetapageUpdate => WalPayload::MetapageUpdate(MetaPage::read_from(reader)?),
            RecordType::LovItemUpdate => {
                let location = read_location(reader)?;
                let entry = LovEntry::read_from(reader)?;
                let new_lov_page = read_u8(reader)? != 0;
                let prev_lov_page = read_opt_page(reader)?;
                let meta = if read_u8(reader)? != 0 {
                    Some(MetaPage::read_from(reader)?)
                } else {
                    None
                };
                WalPayload::LovItemUpdate(LovItemUpdate {
                    location,
                    entry,
                    new_lov_page,
                    prev_lov_page,
                    meta,
                })
            }
            RecordType::BitmapWords => {
                let location = read_location(reader)?;
                let item = LovItem::read_from(reader)?;
                let pages = read_pages(reader)?;
                let init_first_page = read_u8(reader)? != 0;
                WalPayload::BitmapWords(BitmapWordsUpdate {
                    location,
                    item,
                    pages,
                    init_first_page,
                })
            }
            RecordType::UpdateWord => {
                let page = read_u32(reader)?;
                let word_no = read_u32(reader)?;
                let word = read_word(reader)?.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "update_word without a word")
                })?;
                WalPayload::UpdateWord(UpdateWordPatch { page, word_no, word })
            }
            RecordType::LastWords => {
                let location = read_location(reader)?;
                let start_tid = read_u64(reader)?;
                let last_compword = read_word(reader)?;
                WalPayload::LastWords(LastWordsUpdate {
                    location,
                    tail: TailState {
                        start_tid,
                        last_compword,
                        last_word: read_u64(reader)?,
                        last_setbit: read_u64(reader)?,
                        words_covered: read_u64(reader)?,
                    },
                })
            }
            RecordType::UpdateWords => {
                let location = read_location(reader)?;
                let pages = read_pages(reader)?;
                let item = if read_u8(reader)? != 0 {
                    Some(LovItem::read_from(reader)?)
                } else {
                    None
                };
                let new_last_page = read_u8(reader)? != 0;
                WalPayload::UpdateWords(UpdateWordsSplit {
                    location,
                    pages,
                    item,
                    new_last_page,
                })
            }
        })
    }
}

fn write_location<W: Write>(writer: &mut W, location: LovLocation) -> io::Result<()> {
    writer.write_all(&location.page.to_le_bytes())?;
    writer.write_all(&location.offset.to_le_bytes())
}

fn read_location<R: Read>(reader: &mut R) -> io::Result<LovLocation> {
    let page = read_u32(reader)?;
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(LovLocation::new(page, u16::from_le_bytes(buf)))
}

// Explicit presence byte: page 0 is a legal target here.
fn write_opt_page<W: Write>(writer: &mut W, page: Option<PageId>) -> io::Result<()> {
    match page {
        Some(p) => {
            writer.write_all(&[1])?;
            writer.write_all(&p.to_le_bytes())
        }
        None => writer.write_all(&[0]),
    }
}

fn read_opt_page<R: Read>(reader: &mut R) -> io::Result<Option<PageId>> {
    if read_u8(reader)? == 0 {
        Ok(None)
    } else {
        Ok(Some(read_u32(reader)?))
    }
}

/// Format: tag u8 (0 = none, 1 = literal, 2 = fill) then raw content u64
fn write_word<W: Write>(writer: &mut W, word: Option<HrlWord>) -> io::Result<()> {
    match word {
        None => writer.write_all(&[0]),
        Some(word) => {
            let (is_fill, raw) = word.encode();
            writer.write_all(&[if is_fill { 2 } else { 1 }])?;
            writer.write_all(&raw.to_le_bytes())
        }
    }
}

fn read_word<R: Read>(reader: &mut R) -> io::Result<Option<HrlWord>> {
    let tag = read_u8(reader)?;
    if tag == 0 {
        return Ok(None);
    }
    let raw = read_u64(reader)?;
    HrlWord::decode(tag == 2, raw)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn write_pages<W: Write>(writer: &mut W, pages: &[(PageId, BitmapPage)]) -> io::Result<()> {
    writer.write_all(&(pages.len() as u32).to_le_bytes())?;
    for (id, page) in pages {
        writer.write_all(&id.to_le_bytes())?;
        page.write_to(writer)?;
    }
    Ok(())
}

fn read_pages<R: Read>(reader: &mut R) -> io::Result<Vec<(PageId, BitmapPage)>> {
    let count = read_u32(reader)? as usize;
    let mut pages = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let id = read_u32(reader)?;
        pages.push((id, BitmapPage::read_from(reader)?));
    }
    Ok(pages)
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Complete WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Monotonic record number (starts at 1, never repeats)
    pub sequence_number: u64,
    pub payload: WalPayload,
}

/// Length, type, sequence and checksum
pub const RECORD_OVERHEAD: usize = 4 + 1 + 8 + 4;

impl WalRecord {
    pub fn new(sequence_number: u64, payload: WalPayload) -> Self {
        Self {
            sequence_number,
            payload,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }

    /// Serialize the complete record to bytes
    ///
    /// The checksum covers the length field and the body.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        body.push(self.record_type().as_u8());
        body.extend_from_slice(&self.sequence_number.to_le_bytes());
        self.payload.write_to(&mut body)?;

        let record_length = u32::try_from(4 + body.len() + 4).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "WAL record exceeds 4 GiB")
        })?;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);
        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        Ok(record)
    }

    /// Deserialize a record from bytes, verifying checksum
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < RECORD_OVERHEAD {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Record too short"));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < RECORD_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed_checksum = compute_checksum(&data[0..checksum_offset]);
        if computed_checksum != stored_checksum {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed_checksum, stored_checksum
                ),
            ));
        }

        let record_type = RecordType::from_u8(data[4]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record type: {}", data[4]),
            )
        })?;
        let sequence_number = u64::from_le_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);

        let mut cursor = Cursor::new(&data[13..checksum_offset]);
        let payload = WalPayload::read_from(record_type, &mut cursor)?;
        if cursor.position() as usize != checksum_offset - 13 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Trailing bytes in {} payload", record_type.as_str()),
            ));
        }

        Ok((Self::new(sequence_number, payload), record_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lov::{AttributeType, IndexSchema, LovKey};

    fn sample_item() -> LovItem {
        LovItem {
            start_tid: 1,
            head_page: Some(2),
            tail_page: Some(3),
            last_compword: Some(HrlWord::Fill { bit: false, len: 4 }),
            last_word: 0b101,
            last_setbit: 323,
            words_covered: 5,
            page_words: 1,
        }
    }

    fn samples() -> Vec<WalPayload> {
        let meta = MetaPage::new(IndexSchema::new(vec![AttributeType::Text]).unwrap());
        let page = BitmapPage {
            next: Some(3),
            last_tid: 64,
            words: vec![HrlWord::Literal(1)],
        };
        vec![
            WalPayload::MetapageUpdate(meta.clone()),
            WalPayload::LovItemUpdate(LovItemUpdate {
                location: LovLocation::new(1, 0),
                entry: LovEntry::new(LovKey::text("X"), sample_item()),
                new_lov_page: true,
                prev_lov_page: None,
                meta: Some(meta),
            }),
            WalPayload::BitmapWords(BitmapWordsUpdate {
                location: LovLocation::new(1, 0),
                item: sample_item(),
                pages: vec![(2, page.clone()), (3, BitmapPage::new())],
                init_first_page: true,
            }),
            WalPayload::UpdateWord(UpdateWordPatch {
                page: 2,
                word_no: 0,
                word: HrlWord::Literal(3),
            }),
            WalPayload::LastWords(LastWordsUpdate {
                location: LovLocation::new(1, 0),
                tail: TailState::of(&sample_item()),
            }),
            WalPayload::UpdateWords(UpdateWordsSplit {
                location: LovLocation::new(1, 0),
                pages: vec![(2, page)],
                item: None,
                new_last_page: false,
            }),
        ]
    }

    #[test]
    fn test_every_record_type_survives_framing() {
        for (n, payload) in samples().into_iter().enumerate() {
            let record = WalRecord::new(n as u64 + 1, payload);
            let bytes = record.serialize().unwrap();
            let (decoded, consumed) = WalRecord::deserialize(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let record = WalRecord::new(1, samples().remove(3));
        let mut bytes = record.serialize().unwrap();
        bytes[14] ^= 0x40;
        let err = WalRecord::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_unknown_record_type_rejected() {
        let record = WalRecord::new(1, samples().remove(3));
        let mut bytes = record.serialize().unwrap();
        bytes[4] = 42;
        let len = bytes.len();
        let checksum = compute_checksum(&bytes[..len - 4]);
        bytes[len - 4..].copy_from_slice(&checksum.to_le_bytes());
        assert!(WalRecord::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_tail_state_applies_to_item() {
        let source = sample_item();
        let mut target = LovItem {
            head_page: Some(2),
            tail_page: Some(3),
            page_words: 1,
            ..LovItem::new()
        };
        TailState::of(&source).apply_to(&mut target);
        assert_eq!(target, source);
    }
}
