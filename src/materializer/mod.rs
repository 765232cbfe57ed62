//! Row materialization
//!
//! Decodes heterogeneous result documents into uniformly typed rows:
//! joined sub-documents are flattened, the identity field is dropped and
//! every value is decoded under its column's sampled type.

mod decoder;
mod row;

pub use decoder::{decode_value, RowMaterializer};
pub use row::{CellValue, Row};
