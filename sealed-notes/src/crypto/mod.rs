//! Field-level authenticated encryption.
//!
//! Knows nothing about notes, users or storage: text goes in, an opaque
//! printable envelope comes out, and only the matching key turns it back.

mod codec;
mod key;

pub use codec::FieldCodec;
pub use key::{EncryptionKey, KEY_LEN};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Key material is missing or malformed. Fatal at startup.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// The envelope failed to parse or its authentication tag did not verify.
    #[error("field envelope is tampered or corrupt")]
    TamperedOrCorrupt,

    #[error("field encryption failed")]
    SealFailed,
}
