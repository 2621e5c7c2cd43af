//! MS-OFFCRYPTO Agile Encryption decoder for password-protected Office files.
//!
//! Encrypted OOXML documents are stored as an OLE/CFB compound file with two streams:
//! - `EncryptionInfo`: version header + XML key-encryptor descriptor
//! - `EncryptedPackage`: 8-byte plaintext size + AES-CBC ciphertext in 4096-byte segments
//!
//! [`AgileDecoder`] verifies a password against the descriptor, recovers the package key and
//! returns the decrypted package as an [`Artifact`]. Files that are not Agile-encrypted come back
//! as [`Decoded::NotDecryptable`] and a rejected password as [`Decoded::WrongPassword`]; only
//! corrupt containers and I/O failures surface as [`DecodeError`].

mod aes_cbc;
pub mod agile;
mod container;
pub mod crypto;
pub mod encryption_info;
mod error;

#[cfg(test)]
mod fuzz_tests;

use unseal_model::{Artifact, Decoded, Decoder, Source};

pub use crate::aes_cbc::{decrypt_aes_cbc_no_padding, AesCbcDecryptError};
pub use crate::container::{is_encrypted_office, ENCRYPTED_PACKAGE_STREAM, ENCRYPTION_INFO_STREAM};
pub use crate::crypto::{derive_key, derive_key_with, CryptoBackend, HashAlgorithm, RustCrypto};
pub use crate::encryption_info::{
    parse_encryption_info, DataIntegrity, EncryptionInfoError, KeyDerivationParameters,
};
pub use crate::error::DecodeError;

use crate::agile::KeyRecovery;

/// Upper bound on `spinCount` accepted from untrusted input.
///
/// Office writes 100,000; a hostile file could otherwise ask for `u32::MAX` hash rounds per
/// password attempt.
pub const DEFAULT_MAX_SPIN_COUNT: u32 = 1_000_000;

/// Decoder limits and behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Descriptors with a larger `spinCount` are reported as not decryptable.
    pub max_spin_count: u32,
    /// Check the `dataIntegrity` HMAC before decrypting. A mismatch (or a missing element) is an
    /// error.
    pub verify_integrity: bool,
    /// Cut the plaintext to the size declared in the package prefix. When off, whole 4096-byte
    /// segments are returned.
    pub truncate_to_declared_size: bool,
    /// Stop after this many candidate passwords in [`AgileDecoder::decode_any`].
    pub max_attempts: Option<usize>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_spin_count: DEFAULT_MAX_SPIN_COUNT,
            verify_integrity: false,
            truncate_to_declared_size: true,
            max_attempts: None,
        }
    }
}

/// Agile Encryption decoder, generic over the crypto backend.
#[derive(Debug, Clone, Default)]
pub struct AgileDecoder<B = RustCrypto> {
    backend: B,
    options: DecodeOptions,
}

impl AgileDecoder<RustCrypto> {
    pub fn new(options: DecodeOptions) -> Self {
        Self::with_backend(RustCrypto, options)
    }
}

impl<B: CryptoBackend> AgileDecoder<B> {
    pub fn with_backend(backend: B, options: DecodeOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decrypt with a single password.
    pub fn decode_with_password(
        &self,
        source: Source<'_>,
        password: &str,
    ) -> Result<Decoded, DecodeError> {
        self.decode_any(source, [password])
    }

    /// Try `candidates` in order; the descriptor is parsed once and the package is decrypted
    /// only for the first password the verifier accepts.
    pub fn decode_any<I, S>(&self, source: Source<'_>, candidates: I) -> Result<Decoded, DecodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bytes = source.bytes()?;
        let Some(mut ole) = container::open(&bytes) else {
            return Ok(Decoded::not_decryptable("not an OLE compound document"));
        };
        let Some(info) = container::read_stream(&mut ole, ENCRYPTION_INFO_STREAM)? else {
            return Ok(Decoded::not_decryptable("no EncryptionInfo stream"));
        };
        let params = match parse_encryption_info(&info, self.options.max_spin_count) {
            Ok(params) => params,
            Err(err) => {
                log::warn!("EncryptionInfo rejected: {err}");
                return Ok(Decoded::not_decryptable(err.to_string()));
            }
        };

        let mut attempts = 0usize;
        for candidate in candidates {
            if self.options.max_attempts.is_some_and(|max| attempts >= max) {
                log::debug!("giving up after {attempts} password attempt(s)");
                break;
            }
            attempts += 1;
            let password = candidate.as_ref();

            match agile::recover_secret_key(&self.backend, &params, password)? {
                KeyRecovery::WrongPassword => {
                    log::trace!("password candidate #{attempts} rejected by verifier");
                }
                KeyRecovery::Verified(secret) => {
                    let package = container::read_stream(&mut ole, ENCRYPTED_PACKAGE_STREAM)?
                        .ok_or(DecodeError::InvalidPackage("no EncryptedPackage stream"))?;
                    if self.options.verify_integrity {
                        agile::verify_integrity(&self.backend, &params, &secret, &package)?;
                    }
                    let content = agile::decrypt_package(
                        &self.backend,
                        &params,
                        &secret,
                        &package,
                        self.options.truncate_to_declared_size,
                    )?;
                    log::debug!(
                        "decrypted EncryptedPackage ({} bytes) with candidate #{attempts}",
                        content.len()
                    );
                    return Ok(Decoded::Artifact(
                        Artifact::new(ENCRYPTED_PACKAGE_STREAM, content).with_password(password),
                    ));
                }
            }
        }
        Ok(Decoded::WrongPassword)
    }
}

impl<B: CryptoBackend> Decoder for AgileDecoder<B> {
    type Error = DecodeError;

    fn name(&self) -> &'static str {
        "office-agile"
    }

    fn handles(&self, source: Source<'_>) -> bool {
        match source.bytes() {
            Ok(bytes) => is_encrypted_office(&bytes),
            Err(err) => {
                log::debug!("probe could not read source: {err}");
                false
            }
        }
    }

    fn decode(&self, source: Source<'_>, password: &str) -> Result<Decoded, DecodeError> {
        self.decode_with_password(source, password)
    }
}
