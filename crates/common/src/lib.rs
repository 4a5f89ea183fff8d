//! Shared wire constants and codecs for the durable streams protocol.
//!
//! This crate has no HTTP dependency of its own: it is consumed by both
//! the server (which owns the offset encoding) and, for header/query
//! names only, by anything that wants to talk the protocol without
//! duplicating string literals.

pub mod error_code;
pub mod headers;
pub mod offset;
pub mod sse;
pub mod ttl;

pub use error_code::ErrorCode;
pub use offset::{Offset, RequestOffset};
