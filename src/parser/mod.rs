//! Header decoding and content reduction.

pub mod header;
pub mod html;
