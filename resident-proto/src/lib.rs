//! Wire protocol for resident client↔server calls.
//!
//! Messages are serialized with [`postcard`] and framed with a 4-byte
//! big-endian length prefix. A connection carries exactly one [`Request`]
//! followed by exactly one [`Response`].

mod codec;
mod message;

pub use codec::{MAX_FRAME, recv, send};
pub use message::{
    EXIT_FUNCTION, ErrorCode, ErrorInfo, Outcome, PROTOCOL_VERSION, Request, Response,
};
