use aes_gcm::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{Error, Result};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Process-wide note encryption key.
///
/// Built once at startup and handed to [`super::FieldCodec`]. The bytes are
/// wiped on drop and never show up in `Debug` output.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Reads the configured key value. An unset or blank value is reported
    /// as [`Error::KeyUnavailable`], never replaced by a default key.
    pub fn from_config(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(encoded) => Self::from_base64(encoded),
            None => Err(Error::KeyUnavailable("NOTES_ENCRYPTION_KEY is not set".into())),
        }
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::KeyUnavailable("key is not valid base64".into()))?;

        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(Error::KeyUnavailable(format!(
                "key must be {KEY_LEN} bytes, got {len}"
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(Self { bytes })
    }

    /// Fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub(super) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey").field("bytes", &"[redacted]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_unavailable() {
        assert!(matches!(EncryptionKey::from_config(None), Err(Error::KeyUnavailable(_))));
        assert!(matches!(EncryptionKey::from_config(Some("   ")), Err(Error::KeyUnavailable(_))));
    }

    #[test]
    fn malformed_key_is_unavailable() {
        assert!(matches!(
            EncryptionKey::from_base64("not base64 at all!"),
            Err(Error::KeyUnavailable(_))
        ));

        let short = STANDARD.encode([7u8; 16]);
        assert!(matches!(EncryptionKey::from_base64(&short), Err(Error::KeyUnavailable(_))));
    }

    #[test]
    fn base64_key_round_trip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_config(Some(&key.to_base64())).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let key = EncryptionKey::from_bytes([0xAB; KEY_LEN]);
        let printed = format!("{key:?}");
        assert!(printed.contains("[redacted]"));
        assert!(!printed.contains("171"));
        assert!(!printed.contains(&key.to_base64()));
    }
}
