#![no_main]

use libfuzzer_sys::fuzz_target;
use unseal_model::{DuplicateSet, Source, Unpacker, WordList};
use unseal_zip::{UnpackOptions, ZipUnpacker};

const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];

    let mut unpacker = ZipUnpacker::new(
        WordList::new(["infected", "password"]),
        UnpackOptions {
            max_attempts: Some(4),
            max_entry_size: Some(1024 * 1024),
            ..UnpackOptions::default()
        },
    );
    if !unpacker.handles(Source::Bytes(data)) {
        return;
    }
    let mut duplicates = DuplicateSet::new();
    let _ = unpacker.unpack(Source::Bytes(data), Some("infected"), &mut duplicates);
});
