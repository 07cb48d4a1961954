//! Schema definitions: tables, columns, indexes, referential constraints,
//! and the catalog that owns them.

mod catalog;
mod foreign_key;
pub mod table;

pub use catalog::Catalog;
pub use foreign_key::{ForeignKeyDef, ReferentialAction};
pub use table::{ColumnDef, IndexDef, TableDef};
