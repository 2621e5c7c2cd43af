//! Hashing, key derivation and the pluggable crypto backend for Agile encryption.
//!
//! Key derivation:
//! 1. `H = Hash(salt || UTF-16LE(password))`
//! 2. For `i in 0..spinCount`: `H = Hash(LE32(i) || H)`
//! 3. `key = Hash(H || block)` truncated to `keyBits / 8`, or padded with `0x36` when the digest is
//!    shorter than the key.

use digest::Digest;
use hmac::{Hmac, Mac};
use zeroize::{Zeroize as _, Zeroizing};

use crate::aes_cbc::{decrypt_aes_cbc_no_padding, AesCbcDecryptError};
use crate::encryption_info::KeyDerivationParameters;

/// Block key for the `encryptedVerifierHashInput` key.
pub const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
/// Block key for the `encryptedVerifierHashValue` key.
pub const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
/// Block key for the `encryptedKeyValue` key.
pub const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
/// IV block for `dataIntegrity.encryptedHmacKey`.
pub const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
/// IV block for `dataIntegrity.encryptedHmacValue`.
pub const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const KEY_PAD_BYTE: u8 = 0x36;
const IV_PAD_BYTE: u8 = 0x36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Map an XML `hashAlgorithm` attribute to an algorithm.
    ///
    /// Matching ignores case, `-` and `_`. Anything unrecognised falls back to SHA-1.
    pub fn from_offcrypto_name(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "sha1" => Self::Sha1,
            "sha256" => Self::Sha256,
            "sha384" => Self::Sha384,
            "sha512" => Self::Sha512,
            _ => {
                log::debug!("unrecognised hashAlgorithm {name:?}; using SHA1");
                Self::Sha1
            }
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

/// Hash, cipher and MAC primitives used by the decoder.
///
/// [`RustCrypto`] is the default; tests and embedders can substitute another implementation.
pub trait CryptoBackend {
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8>;

    /// AES-CBC decrypt with no padding removal.
    fn aes_cbc_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AesCbcDecryptError>;

    /// `None` if the backend rejects the key.
    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Option<Vec<u8>>;
}

/// Backend built on the RustCrypto `sha1`/`sha2`/`aes`/`hmac` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCrypto;

impl CryptoBackend for RustCrypto {
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        match algorithm {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn aes_cbc_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AesCbcDecryptError> {
        decrypt_aes_cbc_no_padding(key, iv, ciphertext)
    }

    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
        match algorithm {
            HashAlgorithm::Sha1 => {
                let mut mac = <Hmac<sha1::Sha1> as Mac>::new_from_slice(key).ok()?;
                mac.update(data);
                Some(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha256 => {
                let mut mac = <Hmac<sha2::Sha256> as Mac>::new_from_slice(key).ok()?;
                mac.update(data);
                Some(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha384 => {
                let mut mac = <Hmac<sha2::Sha384> as Mac>::new_from_slice(key).ok()?;
                mac.update(data);
                Some(mac.finalize().into_bytes().to_vec())
            }
            HashAlgorithm::Sha512 => {
                let mut mac = <Hmac<sha2::Sha512> as Mac>::new_from_slice(key).ok()?;
                mac.update(data);
                Some(mac.finalize().into_bytes().to_vec())
            }
        }
    }
}

pub(crate) fn password_utf16le(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(password.len().saturating_mul(2)));
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// The spin-count iterated password hash (steps 1 and 2 above).
pub fn iterated_hash<B: CryptoBackend + ?Sized>(
    backend: &B,
    password: &str,
    salt: &[u8],
    algorithm: HashAlgorithm,
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    let pw = password_utf16le(password);
    let mut seed = Zeroizing::new(Vec::with_capacity(salt.len() + pw.len()));
    seed.extend_from_slice(salt);
    seed.extend_from_slice(&pw);
    let mut h = Zeroizing::new(backend.hash(algorithm, &seed));

    let mut round = Zeroizing::new(Vec::with_capacity(4 + h.len()));
    for i in 0..spin_count {
        round.clear();
        round.extend_from_slice(&i.to_le_bytes());
        round.extend_from_slice(&h);
        // Overwrite in place; the previous digest is wiped before the buffer is reused.
        let next = Zeroizing::new(backend.hash(algorithm, &round));
        h.zeroize();
        h.extend_from_slice(&next);
    }
    h
}

/// Step 3: finalize an iterated hash against a block key.
pub fn block_key<B: CryptoBackend + ?Sized>(
    backend: &B,
    iterated: &[u8],
    block: &[u8],
    algorithm: HashAlgorithm,
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut input = Zeroizing::new(Vec::with_capacity(iterated.len() + block.len()));
    input.extend_from_slice(iterated);
    input.extend_from_slice(block);
    let mut key = Zeroizing::new(backend.hash(algorithm, &input));
    key.resize(key_len, KEY_PAD_BYTE);
    key
}

/// `Hash(salt || block)` cut or `0x36`-padded to `len` bytes.
///
/// Used for the per-segment IVs (`block = LE32(segment)`) and the `dataIntegrity` IVs.
pub fn derive_iv<B: CryptoBackend + ?Sized>(
    backend: &B,
    salt: &[u8],
    block: &[u8],
    algorithm: HashAlgorithm,
    len: usize,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(salt.len() + block.len());
    input.extend_from_slice(salt);
    input.extend_from_slice(block);
    let mut iv = backend.hash(algorithm, &input);
    iv.resize(len, IV_PAD_BYTE);
    iv
}

/// Derive the AES key for `block` from `password` and the password key-encryptor parameters.
///
/// Pure and deterministic: the same inputs always yield the same key.
pub fn derive_key(
    password: &str,
    params: &KeyDerivationParameters,
    block: &[u8],
) -> Zeroizing<Vec<u8>> {
    derive_key_with(&RustCrypto, password, params, block)
}

pub fn derive_key_with<B: CryptoBackend + ?Sized>(
    backend: &B,
    password: &str,
    params: &KeyDerivationParameters,
    block: &[u8],
) -> Zeroizing<Vec<u8>> {
    let h = iterated_hash(
        backend,
        password,
        &params.password_salt,
        params.password_hash_algorithm,
        params.spin_count,
    );
    block_key(
        backend,
        &h,
        block,
        params.password_hash_algorithm,
        params.password_key_bits / 8,
    )
}
