//! Fixed-size page storage for the bitmap index
//!
//! Three page kinds share one file: the metapage (block 0), LOV pages and
//! bitmap pages. Every page carries a CRC32 over its payload and is
//! verified on each read.

mod checksum;
mod file;
mod layout;
mod locks;
mod store;

pub use checksum::{compute_checksum, compute_checksum_parts, verify_checksum};
pub use file::FilePageStore;
pub use layout::{
    BitmapPage, LovEntry, LovPage, MetaPage, Page, PageId, PageKind, FORMAT_VERSION,
    METAPAGE_ID, MIN_PAGE_SIZE, PAGE_HEADER_LEN,
};
pub use locks::PageLocks;
pub use store::{MemoryPageStore, PageStore};

pub(crate) use layout::{read_page_ref, write_page_ref};
