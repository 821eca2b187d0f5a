//! `officio-tabular` — tokenizer for heterogeneous spreadsheet exports.
//!
//! Handles the parts of an import that happen before any schema is known:
//! byte decoding (UTF-8 with a Windows-1252 fallback), delimiter sniffing,
//! quoted-field-aware splitting, and header-vs-headerless detection.
//! No domain knowledge lives here.

pub mod decode;
pub mod table;

pub use decode::{decode_bytes, read_file};
pub use table::{detect_header, fold_name, sniff_delimiter, split_rows, Table};
