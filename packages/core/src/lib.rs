//! socket-server core -- identity claims, token verification, wire message
//! schemas, and the external handler payload contract.
//!
//! - **Claims** ([`claims`]): identity extracted from a verified token.
//! - **Token** ([`token`]): pure, clock-explicit bearer token verification.
//! - **Message** ([`message`]): broadcast targeting.
//! - **Handler payload** ([`handler_payload`]): the stable object shape
//!   handed to the external handler process.

pub mod claims;
pub mod handler_payload;
pub mod message;
pub mod token;

pub use claims::Claims;
pub use handler_payload::{HandlerAuth, HandlerData, HandlerPayload};
pub use message::BroadcastType;
pub use token::{TokenError, TokenVerifier};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
