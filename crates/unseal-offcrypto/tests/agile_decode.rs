use std::io::{Cursor, Write};

use aes::{Aes128, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cbc::Encryptor;
use cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use ms_offcrypto_writer::Ecma376AgileWriter;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng as _};
use sha1::Digest as _;

use unseal_model::{Decoded, Decoder, Mode, Source};
use unseal_offcrypto::{
    derive_key, parse_encryption_info, AgileDecoder, DecodeError, DecodeOptions,
    DEFAULT_MAX_SPIN_COUNT,
};

const VERIFIER_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];

/// Parameters for a hand-built Agile container.
struct Fixture {
    hash: &'static str,
    key_bits: usize,
    spin_count: u32,
    password: &'static str,
}

impl Fixture {
    fn sha1() -> Self {
        Self {
            hash: "SHA1",
            key_bits: 128,
            spin_count: 10,
            password: "infected",
        }
    }

    fn sha512() -> Self {
        Self {
            hash: "SHA512",
            key_bits: 256,
            spin_count: 10,
            password: "infected",
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self.hash {
            "SHA1" => sha1::Sha1::digest(data).to_vec(),
            "SHA512" => sha2::Sha512::digest(data).to_vec(),
            other => panic!("fixture does not support {other}"),
        }
    }

    fn key(&self, iterated: &[u8], block: &[u8]) -> Vec<u8> {
        let mut input = iterated.to_vec();
        input.extend_from_slice(block);
        let mut key = self.digest(&input);
        key.resize(self.key_bits / 8, 0x36);
        key
    }

    fn iv(&self, salt: &[u8], block: &[u8]) -> Vec<u8> {
        let mut input = salt.to_vec();
        input.extend_from_slice(block);
        let mut iv = self.digest(&input);
        iv.resize(16, 0x36);
        iv
    }

    fn iterated(&self, salt: &[u8]) -> Vec<u8> {
        let mut seed = salt.to_vec();
        for unit in self.password.encode_utf16() {
            seed.extend_from_slice(&unit.to_le_bytes());
        }
        let mut h = self.digest(&seed);
        for i in 0..self.spin_count {
            let mut round = i.to_le_bytes().to_vec();
            round.extend_from_slice(&h);
            h = self.digest(&round);
        }
        h
    }

    /// Build the full compound file encrypting `plaintext`.
    fn build(&self, plaintext: &[u8]) -> Vec<u8> {
        let password_salt = [0x11u8; 16];
        let key_data_salt = [0x22u8; 16];
        let secret: Vec<u8> = (0..self.key_bits / 8).map(|i| i as u8 ^ 0xA5).collect();
        let verifier_input = [0x5Au8; 16];

        let h = self.iterated(&password_salt);
        let vhi = encrypt(&self.key(&h, &VERIFIER_INPUT_BLOCK), &password_salt, &verifier_input);
        let vhv = encrypt(
            &self.key(&h, &VERIFIER_VALUE_BLOCK),
            &password_salt,
            &self.digest(&verifier_input),
        );
        let kv = encrypt(&self.key(&h, &KEY_VALUE_BLOCK), &password_salt, &secret);

        let mut package = (plaintext.len() as u64).to_le_bytes().to_vec();
        for (i, segment) in plaintext.chunks(4096).enumerate() {
            let iv = self.iv(&key_data_salt, &(i as u32).to_le_bytes());
            package.extend_from_slice(&encrypt(&secret, &iv, segment));
        }

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<keyData saltSize="16" blockSize="16" keyBits="{bits}" hashAlgorithm="{hash}" saltValue="{kd_salt}"/>
<keyEncryptors><keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
<p:encryptedKey spinCount="{spin}" saltSize="16" blockSize="16" keyBits="{bits}" hashAlgorithm="{hash}" saltValue="{pw_salt}" encryptedVerifierHashInput="{vhi}" encryptedVerifierHashValue="{vhv}" encryptedKeyValue="{kv}"/>
</keyEncryptor></keyEncryptors></encryption>"#,
            bits = self.key_bits,
            hash = self.hash,
            spin = self.spin_count,
            kd_salt = BASE64.encode(key_data_salt),
            pw_salt = BASE64.encode(password_salt),
            vhi = BASE64.encode(&vhi),
            vhv = BASE64.encode(&vhv),
            kv = BASE64.encode(&kv),
        );
        let mut info = Vec::new();
        info.extend_from_slice(&4u16.to_le_bytes());
        info.extend_from_slice(&4u16.to_le_bytes());
        info.extend_from_slice(&0x40u32.to_le_bytes());
        info.extend_from_slice(xml.as_bytes());

        compound_file(&[("EncryptionInfo", &info), ("EncryptedPackage", &package)])
    }
}

fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    buf.resize(plaintext.len().div_ceil(16) * 16, 0);
    let len = buf.len();
    match key.len() {
        16 => {
            Encryptor::<Aes128>::new_from_slices(key, iv)
                .expect("aes-128 key")
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .expect("encrypt");
        }
        32 => {
            Encryptor::<Aes256>::new_from_slices(key, iv)
                .expect("aes-256 key")
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .expect("encrypt");
        }
        other => panic!("unsupported key length {other}"),
    }
    buf
}

fn compound_file(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
    for (name, data) in streams {
        ole.create_stream(name)
            .expect("create stream")
            .write_all(data)
            .expect("write stream");
    }
    ole.into_inner().into_inner()
}

fn plaintext(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn decoder() -> AgileDecoder {
    AgileDecoder::new(DecodeOptions::default())
}

#[test]
fn sha1_aes128_container_decrypts_across_segments() {
    let plain = plaintext(9000);
    let bytes = Fixture::sha1().build(&plain);

    let decoded = decoder()
        .decode(Source::Bytes(&bytes), "infected")
        .expect("decode");
    let artifact = decoded.artifact().expect("artifact");
    assert_eq!(artifact.name, "EncryptedPackage");
    assert_eq!(artifact.password.as_deref(), Some("infected"));
    assert_eq!(artifact.mode, Mode::Normal);
    assert_eq!(artifact.content.as_deref(), Some(plain.as_slice()));
}

#[test]
fn sha512_aes256_container_decrypts() {
    let plain = plaintext(4096 + 1);
    let bytes = Fixture::sha512().build(&plain);

    let artifact = decoder()
        .decode(Source::Bytes(&bytes), "infected")
        .expect("decode")
        .artifact()
        .expect("artifact");
    assert_eq!(artifact.content.as_deref(), Some(plain.as_slice()));
}

#[test]
fn wrong_password_is_reported_not_raised() {
    let bytes = Fixture::sha1().build(&plaintext(100));
    let decoded = decoder()
        .decode(Source::Bytes(&bytes), "malware")
        .expect("decode");
    assert_eq!(decoded, Decoded::WrongPassword);
}

#[test]
fn decode_any_returns_first_accepted_candidate() {
    let bytes = Fixture::sha1().build(&plaintext(64));
    let artifact = decoder()
        .decode_any(Source::Bytes(&bytes), ["virus", "", "infected", "malware"])
        .expect("decode")
        .artifact()
        .expect("artifact");
    assert_eq!(artifact.password.as_deref(), Some("infected"));
}

#[test]
fn attempt_limit_stops_before_the_right_password() {
    let bytes = Fixture::sha1().build(&plaintext(64));
    let limited = AgileDecoder::new(DecodeOptions {
        max_attempts: Some(1),
        ..DecodeOptions::default()
    });
    let decoded = limited
        .decode_any(Source::Bytes(&bytes), ["virus", "infected"])
        .expect("decode");
    assert_eq!(decoded, Decoded::WrongPassword);
}

#[test]
fn missing_encryption_info_is_not_decryptable() {
    let bytes = compound_file(&[("EncryptedPackage", &[0u8; 24])]);
    let decoded = decoder()
        .decode(Source::Bytes(&bytes), "infected")
        .expect("decode");
    assert!(
        matches!(decoded, Decoded::NotDecryptable { .. }),
        "unexpected result: {decoded:?}"
    );
    assert!(!decoder().handles(Source::Bytes(&bytes)));
}

#[test]
fn non_ole_input_is_not_decryptable() {
    let decoded = decoder()
        .decode(Source::Bytes(b"PK\x03\x04 definitely a zip"), "infected")
        .expect("decode");
    assert!(matches!(decoded, Decoded::NotDecryptable { .. }));
}

#[test]
fn correct_password_with_missing_package_is_an_error() {
    let full = Fixture::sha1().build(&plaintext(10));
    let mut ole = cfb::CompoundFile::open(Cursor::new(full.as_slice())).expect("open");
    let mut info = Vec::new();
    std::io::Read::read_to_end(&mut ole.open_stream("EncryptionInfo").expect("stream"), &mut info)
        .expect("read");
    let bytes = compound_file(&[("EncryptionInfo", &info)]);

    let err = decoder()
        .decode(Source::Bytes(&bytes), "infected")
        .expect_err("missing package");
    assert!(matches!(err, DecodeError::InvalidPackage(_)), "unexpected error: {err:?}");
}

#[test]
fn decodes_from_a_path() {
    let plain = plaintext(500);
    let bytes = Fixture::sha1().build(&plain);
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("sample.docx");
    std::fs::write(&path, &bytes).expect("write sample");

    let decoder = decoder();
    assert!(decoder.handles(Source::Path(&path)));
    let artifact = decoder
        .decode(Source::Path(&path), "infected")
        .expect("decode")
        .artifact()
        .expect("artifact");
    assert_eq!(artifact.content.as_deref(), Some(plain.as_slice()));
}

#[test]
fn derive_key_is_deterministic() {
    let bytes = Fixture::sha1().build(&plaintext(1));
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes.as_slice())).expect("open");
    let mut info = Vec::new();
    std::io::Read::read_to_end(&mut ole.open_stream("EncryptionInfo").expect("stream"), &mut info)
        .expect("read");
    let params = parse_encryption_info(&info, DEFAULT_MAX_SPIN_COUNT).expect("parse");

    let a = derive_key("infected", &params, &KEY_VALUE_BLOCK);
    let b = derive_key("infected", &params, &KEY_VALUE_BLOCK);
    assert_eq!(a.as_slice(), b.as_slice());
    assert_eq!(a.len(), 16);
    assert_ne!(
        a.as_slice(),
        derive_key("malware", &params, &KEY_VALUE_BLOCK).as_slice()
    );
}

fn office_encrypt(plain: &[u8], password: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut rng = StdRng::from_seed([0u8; 32]);
    let mut agile =
        Ecma376AgileWriter::create(&mut rng, password, &mut cursor).expect("create agile");
    agile.write_all(plain).expect("write plaintext");
    agile.finalize().expect("finalize agile writer");
    cursor.into_inner()
}

#[test]
fn decrypts_office_writer_output_with_integrity_check() {
    let plain = plaintext(12_345);
    let bytes = office_encrypt(&plain, "infected");

    let strict = AgileDecoder::new(DecodeOptions {
        verify_integrity: true,
        ..DecodeOptions::default()
    });
    assert!(strict.handles(Source::Bytes(&bytes)));
    let artifact = strict
        .decode(Source::Bytes(&bytes), "infected")
        .expect("decode")
        .artifact()
        .expect("artifact");
    assert_eq!(artifact.content.as_deref(), Some(plain.as_slice()));

    assert_eq!(
        strict.decode(Source::Bytes(&bytes), "wrong").expect("decode"),
        Decoded::WrongPassword
    );
}

#[test]
fn tampered_package_fails_integrity_check() {
    let bytes = office_encrypt(&plaintext(5000), "infected");
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes.as_slice())).expect("open");
    let mut info = Vec::new();
    let mut package = Vec::new();
    std::io::Read::read_to_end(&mut ole.open_stream("EncryptionInfo").expect("info"), &mut info)
        .expect("read info");
    std::io::Read::read_to_end(
        &mut ole.open_stream("EncryptedPackage").expect("package"),
        &mut package,
    )
    .expect("read package");
    let last = package.len() - 1;
    package[last] ^= 0x01;
    let tampered = compound_file(&[("EncryptionInfo", &info), ("EncryptedPackage", &package)]);

    let strict = AgileDecoder::new(DecodeOptions {
        verify_integrity: true,
        ..DecodeOptions::default()
    });
    let err = strict
        .decode(Source::Bytes(&tampered), "infected")
        .expect_err("tampered");
    assert!(matches!(err, DecodeError::IntegrityCheckFailed), "unexpected error: {err:?}");

    // Without the check the decoder still produces output.
    let lenient = decoder()
        .decode(Source::Bytes(&tampered), "infected")
        .expect("decode");
    assert!(matches!(lenient, Decoded::Artifact(_)));
}
