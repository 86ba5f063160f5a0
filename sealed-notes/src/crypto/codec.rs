use std::{fmt, str::FromStr, sync::Arc};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::{EncryptionKey, Error, Result};

const VERSION: &str = "v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM encryption of single text fields.
///
/// Every call to [`FieldCodec::encrypt_field`] draws a new random nonce, so
/// equal plaintexts never produce equal envelopes.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Arc<Aes256Gcm>,
}

impl FieldCodec {
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        Self {
            cipher: Arc::new(cipher),
        }
    }

    pub fn encrypt_field(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::SealFailed)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce.as_slice());

        Ok(Envelope {
            nonce: nonce_bytes,
            sealed,
        }
        .to_string())
    }

    pub fn decrypt_field(&self, envelope: &str) -> Result<String> {
        let envelope = envelope.parse::<Envelope>()?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.sealed.as_ref())
            .map_err(|_| Error::TamperedOrCorrupt)?;

        String::from_utf8(plaintext).map_err(|_| Error::TamperedOrCorrupt)
    }

    /// Optional fields stay absent; present ones are encrypted, empty strings included.
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<String>> {
        plaintext.map(|p| self.encrypt_field(p)).transpose()
    }

    pub fn decrypt_optional(&self, envelope: Option<&str>) -> Result<Option<String>> {
        envelope.map(|e| self.decrypt_field(e)).transpose()
    }
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCodec").field("cipher", &"Aes256Gcm").finish()
    }
}

/// `v1.<base64url(nonce)>.<base64url(ciphertext || tag)>`
struct Envelope {
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{VERSION}.{}.{}",
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.sealed)
        )
    }
}

impl FromStr for Envelope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let (nonce, sealed) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(VERSION), Some(nonce), Some(sealed), None) => (nonce, sealed),
            _ => return Err(Error::TamperedOrCorrupt),
        };

        let nonce: [u8; NONCE_LEN] = URL_SAFE_NO_PAD
            .decode(nonce)
            .map_err(|_| Error::TamperedOrCorrupt)?
            .try_into()
            .map_err(|_| Error::TamperedOrCorrupt)?;

        let sealed = URL_SAFE_NO_PAD.decode(sealed).map_err(|_| Error::TamperedOrCorrupt)?;
        if sealed.len() < TAG_LEN {
            return Err(Error::TamperedOrCorrupt);
        }

        Ok(Self { nonce, sealed })
    }
}
