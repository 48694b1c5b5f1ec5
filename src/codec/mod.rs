//! # State Codec
//!
//! Turns a [`ProjectDocument`] into a short URL-safe token and back.
//!
//! ## Pipeline
//!
//! | Stage | Module | Reversible form |
//! |-------|--------|-----------------|
//! | 1. Canonical text | [`canonical`] | compact JSON, fixed field order |
//! | 2. Mapping-group swap | [`swap`] + [`header`] | header digits + swapped payload |
//! | 3. Compression | [`token`] | `lz-str` URI-component alphabet |
//!
//! Every decode failure is a [`CodecError`]; registry problems are
//! [`RegistryError`]s raised when a group is registered, never per call.
//!
//! ## Versions
//!
//! | Version | Deadlines written as |
//! |---------|----------------------|
//! | 1 | day offsets from the project start date |
//! | 2 | day offsets or absolute instants |
//!
//! Both are accepted on read; tokens are written as version 2.

pub mod canonical;
pub mod header;
pub mod swap;
pub mod token;

use thiserror::Error;

pub use canonical::{from_canonical, to_canonical};
pub use header::Header;
pub use swap::{MappingGroup, MappingRegistry, RegistryError};
pub use token::{decode, encode};

/// Version written by [`encode`]
pub const FORMAT_VERSION: u32 = 2;

/// Oldest version [`decode`] accepts
pub const MIN_SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Token is empty")]
    EmptyToken,

    #[error("Token contains a character outside the URL-safe alphabet: {0:?}")]
    InvalidCharacter(char),

    #[error("Token could not be decompressed")]
    Decompression,

    #[error("Token header is missing or truncated")]
    MissingHeader,

    #[error("Invalid header digit: {0:?}")]
    InvalidDigit(char),

    #[error("Header number overflows")]
    HeaderOverflow,

    #[error("Unsupported format version: {0}")]
    UnknownVersion(u32),

    #[error("Unknown mapping group: {0}")]
    UnknownGroup(u32),

    #[error("Failed to serialize document: {0}")]
    Serialize(String),

    #[error("Failed to parse document: {0}")]
    Parse(String),
}
