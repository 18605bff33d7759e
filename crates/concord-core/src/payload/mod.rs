//! Backend payload parsing.
//!
//! Turns a backend's free-text reply into a [`ParsedPayload`] or a
//! [`ParseError`]. A shape mismatch is always a returned error, never a panic.

mod parser;
pub mod schema;

pub use parser::{
    extract_json_object, parse_reply, parse_value, ParseError, ParsedPayload,
    DEFAULT_FINDING_CONFIDENCE, DEFAULT_OVERALL_SCORE, DEFAULT_SEVERITY, MAX_SCORE,
};
pub use schema::{validate_payload_schema, SchemaError};
