// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! kond-codec
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The codec is *total*: decoding maps every failure to a typed
//! [`ParseError`] with a JSON path; encoding maps every unserializable
//! construct to an [`EncodeError`]. For every encodable configuration `c`
//! whose features are registered, `decode(encode(c)) == c` and the
//! re-encoding is byte-identical.

mod decode;
mod encode;
mod error;

pub use decode::{apply_patch_json, decode_patch, decode_snapshot, VERSION_RANGE_TAGS};
pub use encode::{encode_patch, encode_snapshot, encode_snapshot_value};
pub use error::{EncodeError, ParseError};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
