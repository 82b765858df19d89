//! Message parsing: header decoding and MIME structure handling.

pub mod header;
pub mod mime;
