//! Cursor types for reading and writing wire bytes without allocation.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;
