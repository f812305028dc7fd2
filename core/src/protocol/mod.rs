//! # RecordHub Protocol Module
//!
//! Request and response bodies are JSON objects. How those objects are
//! delimited on the TCP stream is decided by [`FramingMode`]:
//!
//! - [`FramingMode::JsonStream`] - bare JSON documents back to back, the format
//!   spoken by first-generation clients
//! - [`FramingMode::LengthPrefixed`] - every document preceded by a 4-byte
//!   big-endian length
//!
//! ## Modules
//!
//! - [`messages`] - `Request`, `Response`, `Action` and protocol errors
//! - [`codec`] - `tokio_util` codec splitting a byte stream into frames

pub mod codec;
pub mod messages;
#[cfg(test)]
mod tests;

pub use codec::{CodecError, FramingMode, JsonFrameCodec, DEFAULT_MAX_FRAME_BYTES};
pub use messages::*;
