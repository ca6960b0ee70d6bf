//! # Council Client
//!
//! The HTTP/SSE transport for talking to a council server. [`HttpBackend`]
//! implements `council_core::CouncilBackend`; the driver in `council-stream`
//! consumes its event channel.

pub mod http;
pub mod sse;

pub use http::HttpBackend;
pub use sse::SseDecoder;
