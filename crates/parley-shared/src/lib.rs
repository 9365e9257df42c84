//! # parley-shared
//!
//! Types shared by every Parley crate: identifiers and domain models, the
//! pinned REST wire schema, the message codec, and protocol constants.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use crypto::MessageCipher;
pub use error::{CryptoError, ProtocolError};
