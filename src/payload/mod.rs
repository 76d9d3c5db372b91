//! Payload generation: text message specs and random JSON documents.

pub mod json;
pub mod text;

pub use json::random_json;
pub use text::{MessageSpec, random_alphanumeric, random_upper_alphanumeric};
