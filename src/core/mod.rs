// This module serves as the hub for aotir's shared infrastructure components used by
// both the host IR model and the encoder: error types (EncodeError/EncodeResult built
// on thiserror) and the output plumbing (the Sink trait plus the Streamer that emits
// the wire format's primitive fields). The components here are deliberately free of
// any knowledge of the IR or the wire layout beyond primitive field widths, so they
// can be reasoned about and tested in isolation.

//! Core infrastructure: errors and the output byte stream.

pub mod error;
pub mod stream;

pub use error::{EncodeError, EncodeResult};
pub use stream::{Sink, Streamer};
