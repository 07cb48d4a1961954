//! In-memory row storage with the scan/probe primitives the range
//! iterators consume: full scan, composite equality probe, directional
//! range probe. Row visibility stays an external concern, consulted on
//! every fetch through the [`Visibility`] trait.

mod mem;

pub use mem::{AllVisible, Cursor, IndexKey, MemTable, RowId, Store, Visibility};
