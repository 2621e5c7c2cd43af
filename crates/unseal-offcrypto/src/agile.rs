//! Password verification, secret key recovery and segmented package decryption.
//!
//! The iterated password hash is the expensive step (`spinCount` rounds), so it is computed once
//! per candidate and reused for all three block keys.

use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;

use crate::crypto::{
    block_key, derive_iv, iterated_hash, CryptoBackend, HMAC_KEY_BLOCK, HMAC_VALUE_BLOCK,
    KEY_VALUE_BLOCK, VERIFIER_HASH_INPUT_BLOCK, VERIFIER_HASH_VALUE_BLOCK,
};
use crate::encryption_info::KeyDerivationParameters;
use crate::DecodeError;

/// Plaintext bytes per independently-encrypted `EncryptedPackage` segment.
pub const SEGMENT_LEN: usize = 4096;

const PACKAGE_SIZE_PREFIX_LEN: usize = 8;

/// Outcome of trying one password against the key encryptor.
#[derive(Debug)]
pub enum KeyRecovery {
    /// The verifier matched; holds the package key.
    Verified(Zeroizing<Vec<u8>>),
    WrongPassword,
}

/// Derive the three key-encryptor keys for `password`, check the verifier and, on success,
/// decrypt the package key.
pub fn recover_secret_key<B: CryptoBackend + ?Sized>(
    backend: &B,
    params: &KeyDerivationParameters,
    password: &str,
) -> Result<KeyRecovery, DecodeError> {
    let alg = params.password_hash_algorithm;
    let key_len = params.password_key_bits / 8;
    let iv = &params.password_salt;
    let h = iterated_hash(backend, password, &params.password_salt, alg, params.spin_count);

    let key1 = block_key(backend, &h, &VERIFIER_HASH_INPUT_BLOCK, alg, key_len);
    let verifier_input = Zeroizing::new(backend.aes_cbc_decrypt(
        &key1,
        iv,
        &params.encrypted_verifier_hash_input,
    )?);
    let key2 = block_key(backend, &h, &VERIFIER_HASH_VALUE_BLOCK, alg, key_len);
    let verifier_value = Zeroizing::new(backend.aes_cbc_decrypt(
        &key2,
        iv,
        &params.encrypted_verifier_hash_value,
    )?);

    // The verifier input is one salt-sized block; anything after it is CBC padding.
    let input = verifier_input
        .get(..params.password_salt.len())
        .unwrap_or(&verifier_input[..]);
    let digest = backend.hash(alg, input);
    let Some(expected) = verifier_value.get(..digest.len()) else {
        return Ok(KeyRecovery::WrongPassword);
    };
    if !bool::from(digest.ct_eq(expected)) {
        return Ok(KeyRecovery::WrongPassword);
    }

    let key3 = block_key(backend, &h, &KEY_VALUE_BLOCK, alg, key_len);
    let mut secret = Zeroizing::new(backend.aes_cbc_decrypt(&key3, iv, &params.encrypted_key_value)?);
    let secret_len = params.key_data_key_bits / 8;
    if secret.len() < secret_len {
        return Err(DecodeError::InvalidPackage("decrypted key value is truncated"));
    }
    secret.truncate(secret_len);
    Ok(KeyRecovery::Verified(secret))
}

/// Read the little-endian plaintext size prefix of an `EncryptedPackage` stream.
pub fn declared_size(package: &[u8]) -> Result<u64, DecodeError> {
    let prefix = package
        .get(..PACKAGE_SIZE_PREFIX_LEN)
        .ok_or(DecodeError::InvalidPackage("stream is shorter than its size prefix"))?;
    let mut raw = [0u8; PACKAGE_SIZE_PREFIX_LEN];
    raw.copy_from_slice(prefix);
    Ok(u64::from_le_bytes(raw))
}

/// Decrypt `ceil(declared / 4096)` segments of `package`.
///
/// Segment `i` uses `IV = Hash(keyData.saltValue || LE32(i))[..blockSize]`. With `truncate` the
/// output is cut to the declared size; without it whole segments are returned, block padding
/// included.
pub fn decrypt_package<B: CryptoBackend + ?Sized>(
    backend: &B,
    params: &KeyDerivationParameters,
    secret_key: &[u8],
    package: &[u8],
    truncate: bool,
) -> Result<Vec<u8>, DecodeError> {
    let declared = declared_size(package)?;
    let ciphertext = &package[PACKAGE_SIZE_PREFIX_LEN..];
    // Checked before any allocation so a hostile size prefix cannot force a huge buffer.
    let declared_len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= ciphertext.len())
        .ok_or(DecodeError::PackageSizeOverflow {
            declared,
            available: ciphertext.len(),
        })?;

    let segments = declared_len.div_ceil(SEGMENT_LEN);
    let mut out = Vec::with_capacity(segments.saturating_mul(SEGMENT_LEN).min(ciphertext.len()));
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).take(segments).enumerate() {
        let index = u32::try_from(index)
            .map_err(|_| DecodeError::InvalidPackage("segment index exceeds 32 bits"))?;
        let iv = derive_iv(
            backend,
            &params.key_data_salt,
            &index.to_le_bytes(),
            params.key_data_hash_algorithm,
            params.key_data_block_size,
        );
        out.extend_from_slice(&backend.aes_cbc_decrypt(secret_key, &iv, segment)?);
    }
    log::trace!("decrypted {segments} segment(s), declared size {declared}");

    if truncate {
        out.truncate(declared_len);
    }
    Ok(out)
}

/// Check the `dataIntegrity` HMAC over the whole `EncryptedPackage` stream.
pub fn verify_integrity<B: CryptoBackend + ?Sized>(
    backend: &B,
    params: &KeyDerivationParameters,
    secret_key: &[u8],
    package: &[u8],
) -> Result<(), DecodeError> {
    let integrity = params
        .data_integrity
        .as_ref()
        .ok_or(DecodeError::IntegrityCheckFailed)?;
    let alg = params.key_data_hash_algorithm;
    let digest_len = alg.digest_len();

    let key_iv = derive_iv(
        backend,
        &params.key_data_salt,
        &HMAC_KEY_BLOCK,
        alg,
        params.key_data_block_size,
    );
    let hmac_key = Zeroizing::new(backend.aes_cbc_decrypt(
        secret_key,
        &key_iv,
        &integrity.encrypted_hmac_key,
    )?);
    let value_iv = derive_iv(
        backend,
        &params.key_data_salt,
        &HMAC_VALUE_BLOCK,
        alg,
        params.key_data_block_size,
    );
    let hmac_value = backend.aes_cbc_decrypt(secret_key, &value_iv, &integrity.encrypted_hmac_value)?;

    let key = hmac_key
        .get(..digest_len)
        .ok_or(DecodeError::IntegrityCheckFailed)?;
    let expected = hmac_value
        .get(..digest_len)
        .ok_or(DecodeError::IntegrityCheckFailed)?;
    let computed = backend
        .hmac(alg, key, package)
        .ok_or(DecodeError::IntegrityCheckFailed)?;
    if !bool::from(computed.as_slice().ct_eq(expected)) {
        return Err(DecodeError::IntegrityCheckFailed);
    }
    Ok(())
}
