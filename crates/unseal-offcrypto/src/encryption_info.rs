//! `EncryptionInfo` stream parsing for Agile (4.4) encryption.
//!
//! The stream is an 8-byte version header followed by an XML descriptor. Only the `keyData`,
//! `dataIntegrity` and password `encryptedKey` elements are read; certificate key encryptors are
//! ignored.

use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use crate::aes_cbc::AES_BLOCK_SIZE;
use crate::crypto::HashAlgorithm;

/// Namespace of the password key encryptor (`<p:encryptedKey>`).
pub const PASSWORD_KEY_ENCRYPTOR_NS: &[u8] =
    b"http://schemas.microsoft.com/office/2006/keyEncryptor/password";

const AGILE_VERSION: (u16, u16) = (4, 4);
const VERSION_HEADER_LEN: usize = 8;
const SUPPORTED_KEY_BITS: [usize; 3] = [128, 192, 256];

/// Everything needed to derive keys and decrypt the package for one password encryptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDerivationParameters {
    pub key_data_salt: Vec<u8>,
    pub key_data_hash_algorithm: HashAlgorithm,
    pub key_data_block_size: usize,
    /// Size of the package (secret) key in bits.
    pub key_data_key_bits: usize,
    pub spin_count: u32,
    pub password_salt: Vec<u8>,
    pub password_hash_algorithm: HashAlgorithm,
    pub password_key_bits: usize,
    pub encrypted_key_value: Vec<u8>,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
    pub data_integrity: Option<DataIntegrity>,
}

/// `<dataIntegrity>`: the encrypted HMAC key and value over the `EncryptedPackage` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIntegrity {
    pub encrypted_hmac_key: Vec<u8>,
    pub encrypted_hmac_value: Vec<u8>,
}

/// Why an `EncryptionInfo` stream cannot drive Agile decryption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionInfoError {
    #[error("EncryptionInfo stream is truncated")]
    Truncated,
    #[error("unsupported EncryptionInfo version {major}.{minor} (only Agile 4.4 is supported)")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("spinCount {spin_count} exceeds the configured maximum {max}")]
    SpinCountTooLarge { spin_count: u32, max: u32 },
    #[error("invalid EncryptionInfo: {0}")]
    Invalid(&'static str),
}

type Result<T> = std::result::Result<T, EncryptionInfoError>;

/// Parse and validate a raw `EncryptionInfo` stream.
pub fn parse_encryption_info(stream: &[u8], max_spin_count: u32) -> Result<KeyDerivationParameters> {
    let header = stream
        .get(..VERSION_HEADER_LEN)
        .ok_or(EncryptionInfoError::Truncated)?;
    let major = u16::from_le_bytes([header[0], header[1]]);
    let minor = u16::from_le_bytes([header[2], header[3]]);
    if (major, minor) != AGILE_VERSION {
        return Err(EncryptionInfoError::UnsupportedVersion { major, minor });
    }
    log::trace!("Agile EncryptionInfo, {} bytes of XML", stream.len() - VERSION_HEADER_LEN);

    let params = parse_descriptor(&stream[VERSION_HEADER_LEN..])?;
    params.validate(max_spin_count)?;
    Ok(params)
}

fn parse_descriptor(xml: &[u8]) -> Result<KeyDerivationParameters> {
    let xml = std::str::from_utf8(xml)
        .map_err(|_| EncryptionInfoError::Invalid("descriptor XML is not valid UTF-8"))?;
    let xml = xml.trim_start_matches('\u{feff}');

    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = Fields::default();
    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(e) | Event::Empty(e))) => fields.visit(&ns, &e)?,
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(_) => return Err(EncryptionInfoError::Invalid("malformed descriptor XML")),
        }
    }
    fields.finish()
}

fn is_password_encryptor(ns: &ResolveResult<'_>) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => *uri == PASSWORD_KEY_ENCRYPTOR_NS,
        // Undeclared `p:` prefix; some writers omit the xmlns declaration.
        ResolveResult::Unknown(prefix) => prefix.as_slice() == b"p",
        ResolveResult::Unbound => false,
    }
}

struct KeyData {
    salt: Vec<u8>,
    hash_algorithm: HashAlgorithm,
    block_size: usize,
    key_bits: Option<usize>,
}

struct PasswordKey {
    spin_count: u32,
    salt: Vec<u8>,
    hash_algorithm: HashAlgorithm,
    key_bits: usize,
    encrypted_key_value: Vec<u8>,
    encrypted_verifier_hash_input: Vec<u8>,
    encrypted_verifier_hash_value: Vec<u8>,
}

#[derive(Default)]
struct Fields {
    key_data: Option<KeyData>,
    data_integrity: Option<DataIntegrity>,
    password: Option<PasswordKey>,
}

impl Fields {
    fn visit(&mut self, ns: &ResolveResult<'_>, e: &BytesStart<'_>) -> Result<()> {
        match e.local_name().as_ref() {
            b"keyData" if self.key_data.is_none() => {
                let attrs = Attrs::read(e)?;
                self.key_data = Some(KeyData {
                    salt: attrs.base64(b"saltValue", "keyData.saltValue is missing")?,
                    hash_algorithm: attrs.hash_algorithm(),
                    block_size: attrs
                        .number_or(b"blockSize", AES_BLOCK_SIZE, "keyData.blockSize is not a number")?,
                    key_bits: attrs.optional_number(b"keyBits", "keyData.keyBits is not a number")?,
                });
            }
            b"dataIntegrity" if self.data_integrity.is_none() => {
                let attrs = Attrs::read(e)?;
                match (
                    attrs.base64(b"encryptedHmacKey", "missing"),
                    attrs.base64(b"encryptedHmacValue", "missing"),
                ) {
                    (Ok(encrypted_hmac_key), Ok(encrypted_hmac_value)) => {
                        self.data_integrity = Some(DataIntegrity {
                            encrypted_hmac_key,
                            encrypted_hmac_value,
                        });
                    }
                    _ => log::warn!("ignoring unreadable <dataIntegrity> element"),
                }
            }
            b"encryptedKey" if self.password.is_none() && is_password_encryptor(ns) => {
                let attrs = Attrs::read(e)?;
                self.password = Some(PasswordKey {
                    spin_count: attrs.number(b"spinCount", "encryptedKey.spinCount is missing or invalid")?,
                    salt: attrs.base64(b"saltValue", "encryptedKey.saltValue is missing")?,
                    hash_algorithm: attrs.hash_algorithm(),
                    key_bits: attrs.number(b"keyBits", "encryptedKey.keyBits is missing or invalid")?,
                    encrypted_key_value: attrs
                        .base64(b"encryptedKeyValue", "encryptedKey.encryptedKeyValue is missing")?,
                    encrypted_verifier_hash_input: attrs.base64(
                        b"encryptedVerifierHashInput",
                        "encryptedKey.encryptedVerifierHashInput is missing",
                    )?,
                    encrypted_verifier_hash_value: attrs.base64(
                        b"encryptedVerifierHashValue",
                        "encryptedKey.encryptedVerifierHashValue is missing",
                    )?,
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<KeyDerivationParameters> {
        let key_data = self
            .key_data
            .ok_or(EncryptionInfoError::Invalid("missing <keyData> element"))?;
        let password = self
            .password
            .ok_or(EncryptionInfoError::Invalid("missing password <encryptedKey> element"))?;
        Ok(KeyDerivationParameters {
            key_data_salt: key_data.salt,
            key_data_hash_algorithm: key_data.hash_algorithm,
            key_data_block_size: key_data.block_size,
            key_data_key_bits: key_data.key_bits.unwrap_or(password.key_bits),
            spin_count: password.spin_count,
            password_salt: password.salt,
            password_hash_algorithm: password.hash_algorithm,
            password_key_bits: password.key_bits,
            encrypted_key_value: password.encrypted_key_value,
            encrypted_verifier_hash_input: password.encrypted_verifier_hash_input,
            encrypted_verifier_hash_value: password.encrypted_verifier_hash_value,
            data_integrity: self.data_integrity,
        })
    }
}

impl KeyDerivationParameters {
    fn validate(&self, max_spin_count: u32) -> Result<()> {
        use EncryptionInfoError::Invalid;

        if self.spin_count > max_spin_count {
            return Err(EncryptionInfoError::SpinCountTooLarge {
                spin_count: self.spin_count,
                max: max_spin_count,
            });
        }
        if self.key_data_block_size != AES_BLOCK_SIZE {
            return Err(Invalid("keyData.blockSize must be 16"));
        }
        if self.key_data_salt.is_empty() {
            return Err(Invalid("keyData.saltValue is empty"));
        }
        // The password salt doubles as the IV for the key encryptor fields.
        if self.password_salt.len() != AES_BLOCK_SIZE {
            return Err(Invalid("encryptedKey.saltValue must be 16 bytes"));
        }
        if !SUPPORTED_KEY_BITS.contains(&self.password_key_bits) {
            return Err(Invalid("encryptedKey.keyBits must be 128, 192 or 256"));
        }
        if !SUPPORTED_KEY_BITS.contains(&self.key_data_key_bits) {
            return Err(Invalid("keyData.keyBits must be 128, 192 or 256"));
        }
        for (field, context) in [
            (&self.encrypted_key_value, "encryptedKeyValue is not whole AES blocks"),
            (
                &self.encrypted_verifier_hash_input,
                "encryptedVerifierHashInput is not whole AES blocks",
            ),
            (
                &self.encrypted_verifier_hash_value,
                "encryptedVerifierHashValue is not whole AES blocks",
            ),
        ] {
            if field.is_empty() || field.len() % AES_BLOCK_SIZE != 0 {
                return Err(Invalid(context));
            }
        }
        if self.encrypted_verifier_hash_value.len() < self.password_hash_algorithm.digest_len() {
            return Err(Invalid("encryptedVerifierHashValue is shorter than the digest"));
        }
        if self.encrypted_key_value.len() < self.key_data_key_bits / 8 {
            return Err(Invalid("encryptedKeyValue is shorter than the package key"));
        }
        Ok(())
    }
}

/// Attributes of one element, keyed by local name.
struct Attrs(Vec<(Vec<u8>, Vec<u8>)>);

impl Attrs {
    fn read(e: &BytesStart<'_>) -> Result<Self> {
        let mut out = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|_| EncryptionInfoError::Invalid("malformed XML attribute"))?;
            out.push((
                attr.key.local_name().as_ref().to_vec(),
                attr.value.as_ref().to_vec(),
            ));
        }
        Ok(Self(out))
    }

    fn raw(&self, name: &[u8]) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(key, _)| key.as_slice() == name)
            .map(|(_, value)| value.as_slice())
    }

    fn text(&self, name: &[u8]) -> Option<&str> {
        self.raw(name)
            .and_then(|value| std::str::from_utf8(value).ok())
            .map(str::trim)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.text(b"hashAlgorithm")
            .map(HashAlgorithm::from_offcrypto_name)
            .unwrap_or_default()
    }

    fn number<T: FromStr>(&self, name: &[u8], context: &'static str) -> Result<T> {
        self.optional_number(name, context)?
            .ok_or(EncryptionInfoError::Invalid(context))
    }

    fn number_or<T: FromStr>(&self, name: &[u8], default: T, context: &'static str) -> Result<T> {
        Ok(self.optional_number(name, context)?.unwrap_or(default))
    }

    fn optional_number<T: FromStr>(&self, name: &[u8], context: &'static str) -> Result<Option<T>> {
        match self.raw(name) {
            None => Ok(None),
            Some(_) => self
                .text(name)
                .and_then(|s| s.parse().ok())
                .map(Some)
                .ok_or(EncryptionInfoError::Invalid(context)),
        }
    }

    fn base64(&self, name: &[u8], missing: &'static str) -> Result<Vec<u8>> {
        let value = self.raw(name).ok_or(EncryptionInfoError::Invalid(missing))?;
        decode_base64(value)
    }
}

/// Decode a base64 attribute, tolerating embedded whitespace and missing `=` padding.
fn decode_base64(value: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = value
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
        .map_err(|_| EncryptionInfoError::Invalid("invalid base64 attribute value"))
}
