//! Canonical textual form
//!
//! Compact JSON. Struct fields serialize in declaration order and the opaque
//! sharing record is a sorted map, so equal documents give equal text. This
//! is also the plain-text export format.

use super::CodecError;
use crate::domain::ProjectDocument;

/// Renders the document in canonical form
pub fn to_canonical(doc: &ProjectDocument) -> Result<String, CodecError> {
    serde_json::to_string(doc).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Parses a document from canonical form
///
/// Pretty-printed JSON of the same shape is accepted too.
pub fn from_canonical(text: &str) -> Result<ProjectDocument, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Parse(e.to_string()))
}
