//! Cross-context message protocol: wire envelope, origins and trust, and validation.
//!
//! Every message exchanged between an embedded app and its broker travels as a JSON
//! [`Envelope`] (`{messageType, version, correlationId, payload}`). Receivers never trust the
//! payload for identity: the sender's [`Origin`] always comes from the transport, and
//! [`validate`] pairs it with the decoded body. Structural failures are dropped silently,
//! while trust failures surface as [`crate::error::Error::UntrustedOrigin`] through
//! [`TrustedDomains::verify`].

pub mod message;
pub mod origin;
pub mod validator;

pub use message::*;
pub use origin::*;
pub use validator::*;
