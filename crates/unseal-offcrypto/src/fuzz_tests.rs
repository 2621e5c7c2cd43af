#![allow(unexpected_cfgs)]

use proptest::prelude::*;
use std::panic::AssertUnwindSafe;

use super::*;
use crate::agile::decrypt_package;
use unseal_model::OLE_MAGIC;

// Heavier runs: build with `RUSTFLAGS="--cfg fuzzing"`.
#[cfg(fuzzing)]
const CASES: u32 = 1024;
#[cfg(not(fuzzing))]
const CASES: u32 = 64;

#[cfg(fuzzing)]
const MAX_INPUT_LEN: usize = 256 * 1024;
#[cfg(not(fuzzing))]
const MAX_INPUT_LEN: usize = 16 * 1024;

fn sample_params() -> KeyDerivationParameters {
    KeyDerivationParameters {
        key_data_salt: vec![0u8; 16],
        key_data_hash_algorithm: HashAlgorithm::Sha1,
        key_data_block_size: 16,
        key_data_key_bits: 128,
        spin_count: 0,
        password_salt: vec![0u8; 16],
        password_hash_algorithm: HashAlgorithm::Sha1,
        password_key_bits: 128,
        encrypted_key_value: vec![0u8; 16],
        encrypted_verifier_hash_input: vec![0u8; 16],
        encrypted_verifier_hash_value: vec![0u8; 32],
        data_integrity: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: CASES,
        max_shrink_iters: 0,
        .. ProptestConfig::default()
    })]

    #[test]
    fn encryption_info_parser_rejects_garbage_without_panicking(
        tail in proptest::collection::vec(any::<u8>(), 0..=MAX_INPUT_LEN),
    ) {
        // `<` followed by 0xFF is never valid UTF-8, so the result must be an error.
        let mut bytes = Vec::with_capacity(10 + tail.len());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0x40u32.to_le_bytes());
        bytes.push(b'<');
        bytes.push(0xFF);
        bytes.extend_from_slice(&tail);

        let res = std::panic::catch_unwind(AssertUnwindSafe(|| parse_encryption_info(&bytes, DEFAULT_MAX_SPIN_COUNT)));
        prop_assert!(res.is_ok(), "parse_encryption_info panicked");
        prop_assert!(res.unwrap().is_err());
    }

    #[test]
    fn package_decryption_is_panic_free(
        declared in any::<u64>(),
        truncate in any::<bool>(),
        ciphertext in proptest::collection::vec(any::<u8>(), 0..=MAX_INPUT_LEN),
    ) {
        let mut package = declared.to_le_bytes().to_vec();
        package.extend_from_slice(&ciphertext);

        let params = sample_params();
        let res = std::panic::catch_unwind(AssertUnwindSafe(|| {
            decrypt_package(&RustCrypto, &params, &[0u8; 16], &package, truncate)
        }));
        prop_assert!(res.is_ok(), "decrypt_package panicked");
        if declared > ciphertext.len() as u64 {
            let is_overflow = matches!(res.unwrap(), Err(DecodeError::PackageSizeOverflow { .. }));
            prop_assert!(is_overflow);
        }
    }

    #[test]
    fn decoder_never_yields_an_artifact_from_garbage(
        ole_prefix in any::<bool>(),
        body in proptest::collection::vec(any::<u8>(), 0..=4096),
    ) {
        let mut bytes = Vec::new();
        if ole_prefix {
            bytes.extend_from_slice(&OLE_MAGIC);
        }
        bytes.extend_from_slice(&body);

        let decoder = AgileDecoder::new(DecodeOptions::default());
        let res = std::panic::catch_unwind(AssertUnwindSafe(|| {
            decoder.decode_any(Source::Bytes(&bytes), ["infected", "password"])
        }));
        prop_assert!(res.is_ok(), "decode_any panicked");
        let decoded = res.unwrap();
        prop_assert!(!matches!(decoded, Ok(Decoded::Artifact(_))));
    }
}
