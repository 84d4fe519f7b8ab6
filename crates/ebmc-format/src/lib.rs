//! Serialization of Extended Binary Modules.
//!
//! Two parallel encodings exist: the binary format (prefix varints, kind
//! codes, declaration-order fields) used as the pipeline artifact, and a
//! JSON form for diagnostics and round-trip testing.

pub mod binary;
pub mod error;
pub mod json;
pub mod varint;

pub use binary::{decode_module, encode_module};
pub use error::FormatError;
pub use json::{from_json, from_json_str, to_json, to_json_string};
pub use varint::{read_varint, varint_len, write_varint, VARINT_MAX};
