//! Document value model, validation, and serialization
//!
//! Documents are maps of restricted JSON-like values. The validator is the
//! single entry point for caller-supplied payloads; the codec round-trips
//! validated field maps through a storage string.

pub mod codec;
mod errors;
mod types;
pub mod validator;

pub use errors::{ValidationError, ValidationResult};
pub use types::{Fields, Value};
pub use validator::{check_field_name, validate_payload, FIELD_CREATION_TIME, FIELD_ID};
