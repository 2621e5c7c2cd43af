use std::io;

use crate::aes_cbc::AesCbcDecryptError;

/// Faults that abort a decode.
///
/// A wrong password or a container that is not Agile-encrypted is *not* an error: those come back
/// as [`unseal_model::Decoded::WrongPassword`] / [`unseal_model::Decoded::NotDecryptable`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("AES-CBC decryption failed: {0}")]
    Cipher(#[from] AesCbcDecryptError),
    #[error("invalid EncryptedPackage: {0}")]
    InvalidPackage(&'static str),
    #[error(
        "EncryptedPackage declares {declared} plaintext bytes but only {available} ciphertext bytes are present"
    )]
    PackageSizeOverflow { declared: u64, available: usize },
    #[error("dataIntegrity HMAC mismatch")]
    IntegrityCheckFailed,
}
