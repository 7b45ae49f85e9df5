//! Persisted page layout
//!
//! Every page is exactly `page_size` bytes:
//!
//! ```text
//! +------------------+
//! | Kind             | (u8: 1 = meta, 2 = LOV, 3 = bitmap)
//! +------------------+
//! | Payload Length   | (u32 LE)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over kind, length and payload)
//! +------------------+
//! | Payload          |
//! +------------------+
//! | Zero padding     |
//! +------------------+
//! ```
//!
//! Page references are u32 block numbers; 0 (the metapage) doubles as the
//! null pointer because no chain ever points back at the metapage.

use std::io::{self, Cursor, Read, Write};

use super::checksum::compute_checksum_parts;
use crate::errors::{BitmapError, BitmapResult, ErrorContext};
use crate::hrl::{decode_words, encode_words, HeaderBits, HrlWord};
use crate::lov::{AttributeType, IndexSchema, LovItem, LovKey};
use crate::tid::Tid;

/// Block number of a page
pub type PageId = u32;

/// The metapage always lives in block 0
pub const METAPAGE_ID: PageId = 0;

/// Smallest supported page size
pub const MIN_PAGE_SIZE: usize = 256;

/// Kind, payload length and checksum
pub const PAGE_HEADER_LEN: usize = 1 + 4 + 4;

/// Bytes reserved on a bitmap page for everything except words
const BITMAP_PAGE_OVERHEAD: usize = 40;

const META_MAGIC: u32 = 0x4248_524C;

/// On-disk format version
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    Meta = 1,
    Lov = 2,
    Bitmap = 3,
}

impl PageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PageKind::Meta),
            2 => Some(PageKind::Lov),
            3 => Some(PageKind::Bitmap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Meta => "meta",
            PageKind::Lov => "lov",
            PageKind::Bitmap => "bitmap",
        }
    }
}

pub(crate) fn write_page_ref<W: Write>(writer: &mut W, page: Option<PageId>) -> io::Result<()> {
    writer.write_all(&page.unwrap_or(0).to_le_bytes())
}

pub(crate) fn read_page_ref<R: Read>(reader: &mut R) -> io::Result<Option<PageId>> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    let page = u32::from_le_bytes(buf);
    Ok(if page == 0 { None } else { Some(page) })
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
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

/// Global index metadata, read once per index open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaPage {
    pub schema: IndexSchema,
    pub lov_head: Option<PageId>,
    pub lov_tail: Option<PageId>,
    pub lov_entries: u64,
    /// Highest TID inserted so far
    pub max_tid: Tid,
}

impl MetaPage {
    pub fn new(schema: IndexSchema) -> Self {
        Self {
            schema,
            lov_head: None,
            lov_tail: None,
            lov_entries: 0,
            max_tid: 0,
        }
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&META_MAGIC.to_le_bytes())?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&[self.schema.attributes.len() as u8])?;
        for attribute in &self.schema.attributes {
            writer.write_all(&[attribute.as_u8()])?;
        }
        write_page_ref(writer, self.lov_head)?;
        write_page_ref(writer, self.lov_tail)?;
        writer.write_all(&self.lov_entries.to_le_bytes())?;
        writer.write_all(&self.max_tid.to_le_bytes())?;
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let magic = read_u32(reader)?;
        if magic != META_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Bad metapage magic: {:08x}", magic),
            ));
        }
        let version = read_u16(reader)?;
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported format version: {}", version),
            ));
        }
        let mut count = [0u8; 1];
        reader.read_exact(&mut count)?;
        let mut attributes = Vec::with_capacity(count[0] as usize);
        for _ in 0..count[0] {
            let mut tag = [0u8; 1];
            reader.read_exact(&mut tag)?;
            let attribute = AttributeType::from_u8(tag[0]).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid attribute type: {}", tag[0]),
                )
            })?;
            attributes.push(attribute);
        }
        let schema = IndexSchema::new(attributes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(Self {
            schema,
            lov_head: read_page_ref(reader)?,
            lov_tail: read_page_ref(reader)?,
            lov_entries: read_u64(reader)?,
            max_tid: read_u64(reader)?,
        })
    }
}

/// One distinct key and the descriptor of its vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LovEntry {
    pub key: LovKey,
    pub item: LovItem,
}

impl LovEntry {
    pub fn new(key: LovKey, item: LovItem) -> Self {
        Self { key, item }
    }

    pub fn encoded_len(&self) -> usize {
        self.key.encoded_len() + LovItem::ENCODED_LEN
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.key.write_to(writer)?;
        self.item.write_to(writer)
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let key = LovKey::read_from(reader)?;
        let item = LovItem::read_from(reader)?;
        Ok(Self { key, item })
    }
}

/// Page of LOV entries, chained through `next`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LovPage {
    pub next: Option<PageId>,
    pub entries: Vec<LovEntry>,
}

impl LovPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn payload_len(&self) -> usize {
        4 + 2 + self.entries.iter().map(|e| e.encoded_len()).sum::<usize>()
    }

    /// Whether `entry` can be appended without overflowing the page
    pub fn has_room_for(&self, entry: &LovEntry, page_size: usize) -> bool {
        self.entries.len() < u16::MAX as usize
            && PAGE_HEADER_LEN + self.payload_len() + entry.encoded_len() <= page_size
    }

    pub fn entry(&self, offset: u16, page: PageId) -> BitmapResult<&LovEntry> {
        self.entries.get(offset as usize).ok_or_else(|| {
            BitmapError::format(
                format!(
                    "LOV slot {} out of range ({} entries)",
                    offset,
                    self.entries.len()
                ),
                ErrorContext::page(page),
            )
        })
    }

    /// Replaces slot `offset`, or appends when `offset` is one past the end.
    pub fn set_entry(&mut self, offset: u16, entry: LovEntry, page: PageId) -> BitmapResult<()> {
        let offset = offset as usize;
        if offset < self.entries.len() {
            self.entries[offset] = entry;
            Ok(())
        } else if offset == self.entries.len() {
            self.entries.push(entry);
            Ok(())
        } else {
            Err(BitmapError::format(
                format!(
                    "LOV slot {} leaves a gap after {} entries",
                    offset,
                    self.entries.len()
                ),
                ErrorContext::page(page),
            ))
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_page_ref(writer, self.next)?;
        writer.write_all(&(self.entries.len() as u16).to_le_bytes())?;
        for entry in &self.entries {
            entry.write_to(writer)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let next = read_page_ref(reader)?;
        let count = read_u16(reader)? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(LovEntry::read_from(reader)?);
        }
        Ok(Self { next, entries })
    }
}

/// Page of HRL words belonging to one vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitmapPage {
    pub next: Option<PageId>,
    /// Absolute TID covered by the last word on this page
    pub last_tid: Tid,
    pub words: Vec<HrlWord>,
}

impl BitmapPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content words that fit on one page
    pub fn capacity(page_size: usize) -> usize {
        (page_size.saturating_sub(BITMAP_PAGE_OVERHEAD)) * 64 / 520
    }

    pub fn is_full(&self, page_size: usize) -> bool {
        self.words.len() >= Self::capacity(page_size)
    }

    /// Uncompressed words stored on this page
    pub fn uncompressed_len(&self) -> u64 {
        self.words.iter().map(|w| w.word_len()).sum()
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_page_ref(writer, self.next)?;
        writer.write_all(&self.last_tid.to_le_bytes())?;
        writer.write_all(&(self.words.len() as u32).to_le_bytes())?;
        let (headers, content) = encode_words(&self.words);
        for h in headers.raw() {
            writer.write_all(&h.to_le_bytes())?;
        }
        for c in &content {
            writer.write_all(&c.to_le_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let next = read_page_ref(reader)?;
        let last_tid = read_u64(reader)?;
        let count = read_u32(reader)? as usize;
        let mut raw_headers = Vec::with_capacity(HeaderBits::header_words_for(count));
        for _ in 0..HeaderBits::header_words_for(count) {
            raw_headers.push(read_u64(reader)?);
        }
        let mut content = Vec::with_capacity(count);
        for _ in 0..count {
            content.push(read_u64(reader)?);
        }
        let invalid = |e: BitmapError| io::Error::new(io::ErrorKind::InvalidData, e.to_string());
        let headers = HeaderBits::from_raw(raw_headers, count).map_err(invalid)?;
        let words = decode_words(&headers, &content).map_err(invalid)?;
        Ok(Self {
            next,
            last_tid,
            words,
        })
    }
}

/// A decoded page of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Meta(MetaPage),
    Lov(LovPage),
    Bitmap(BitmapPage),
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Meta(_) => PageKind::Meta,
            Page::Lov(_) => PageKind::Lov,
            Page::Bitmap(_) => PageKind::Bitmap,
        }
    }

    /// Serializes to exactly `page_size` bytes.
    pub fn serialize(&self, page_size: usize) -> BitmapResult<Vec<u8>> {
        let mut payload = Vec::new();
        let written = match self {
            Page::Meta(meta) => meta.write_to(&mut payload),
            Page::Lov(lov) => lov.write_to(&mut payload),
            Page::Bitmap(bitmap) => bitmap.write_to(&mut payload),
        };
        written.map_err(|e| {
            BitmapError::format(format!("failed to encode page: {}", e), ErrorContext::none())
        })?;

        if PAGE_HEADER_LEN + payload.len() > page_size {
            return Err(BitmapError::format(
                format!(
                    "{} page payload of {} bytes exceeds page size {}",
                    self.kind().as_str(),
                    payload.len(),
                    page_size
                ),
                ErrorContext::none(),
            ));
        }

        let kind = [self.kind() as u8];
        let len = (payload.len() as u32).to_le_bytes();
        let checksum = compute_checksum_parts(&[&kind, &len, &payload]);

        let mut page = Vec::with_capacity(page_size);
        page.extend_from_slice(&kind);
        page.extend_from_slice(&len);
        page.extend_from_slice(&checksum.to_le_bytes());
        page.extend_from_slice(&payload);
        page.resize(page_size, 0);
        Ok(page)
    }

    /// Parses and verifies a page image read from block `id`.
    pub fn deserialize(bytes: &[u8], id: PageId) -> BitmapResult<Self> {
        let ctx = || ErrorContext::page(id);
        if bytes.len() < PAGE_HEADER_LEN {
            return Err(BitmapError::format(
                format!("page image of {} bytes is truncated", bytes.len()),
                ctx(),
            ));
        }
        if bytes[0] == 0 {
            return Err(BitmapError::format("page was never initialized", ctx()));
        }
        let kind = PageKind::from_u8(bytes[0]).ok_or_else(|| {
            BitmapError::format(format!("unknown page kind {}", bytes[0]), ctx())
        })?;
        let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let stored = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        if PAGE_HEADER_LEN + len > bytes.len() {
            return Err(BitmapError::format(
                format!("payload length {} overruns page", len),
                ctx(),
            ));
        }
        let payload = &bytes[PAGE_HEADER_LEN..PAGE_HEADER_LEN + len];
        let computed = compute_checksum_parts(&[&bytes[0..1], &bytes[1..5], payload]);
        if computed != stored {
            return Err(BitmapError::format(
                format!(
                    "page checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
                ctx(),
            ));
        }

        let mut cursor = Cursor::new(payload);
        let parsed = match kind {
            PageKind::Meta => MetaPage::read_from(&mut cursor).map(Page::Meta),
            PageKind::Lov => LovPage::read_from(&mut cursor).map(Page::Lov),
            PageKind::Bitmap => BitmapPage::read_from(&mut cursor).map(Page::Bitmap),
        };
        parsed.map_err(|e| {
            BitmapError::format(format!("malformed {} page: {}", kind.as_str(), e), ctx())
        })
    }

    pub fn into_meta(self, id: PageId) -> BitmapResult<MetaPage> {
        match self {
            Page::Meta(meta) => Ok(meta),
            other => Err(wrong_kind(id, PageKind::Meta, other.kind())),
        }
    }

    pub fn into_lov(self, id: PageId) -> BitmapResult<LovPage> {
        match self {
            Page::Lov(lov) => Ok(lov),
            other => Err(wrong_kind(id, PageKind::Lov, other.kind())),
        }
    }

    pub fn into_bitmap(self, id: PageId) -> BitmapResult<BitmapPage> {
        match self {
            Page::Bitmap(bitmap) => Ok(bitmap),
            other => Err(wrong_kind(id, PageKind::Bitmap, other.kind())),
        }
    }
}

fn wrong_kind(id: PageId, expected: PageKind, found: PageKind) -> BitmapError {
    BitmapError::format(
        format!(
            "expected a {} page, found a {} page",
            expected.as_str(),
            found.as_str()
        ),
        ErrorContext::page(id),
    )
}
