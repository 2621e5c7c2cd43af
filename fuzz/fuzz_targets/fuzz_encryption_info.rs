#![no_main]

use libfuzzer_sys::fuzz_target;
use unseal_model::{Decoder, Source};
use unseal_offcrypto::{parse_encryption_info, AgileDecoder, DecodeOptions};

/// Low enough that a fuzzed descriptor cannot stall the harness in the KDF loop.
const MAX_FUZZ_SPIN_COUNT: u32 = 64;
const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    // Raw `EncryptionInfo` stream.
    let _ = parse_encryption_info(data, MAX_FUZZ_SPIN_COUNT);

    // Whole-container path: OLE probe, stream lookup and decode.
    let decoder = AgileDecoder::new(DecodeOptions {
        max_spin_count: MAX_FUZZ_SPIN_COUNT,
        verify_integrity: data.first().is_some_and(|b| b & 1 == 1),
        ..DecodeOptions::default()
    });
    if decoder.handles(Source::Bytes(data)) {
        let _ = decoder.decode(Source::Bytes(data), "infected");
    }
});
