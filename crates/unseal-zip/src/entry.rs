//! Reading one zip entry and classifying the result.
//!
//! ZipCrypto has no authenticator beyond a one-byte header check, so a wrong password that slips
//! past it only surfaces later as a CRC, inflate or AES authentication failure. On an *encrypted*
//! entry those data errors are treated as a wrong password. Truncation and every other I/O
//! failure is corruption, as is any read failure on a plain entry.

use std::io::{self, Read, Seek};

use zip::result::ZipError;
use zip::ZipArchive;

/// Metadata read from the central directory without decrypting anything.
#[derive(Debug, Clone)]
pub(crate) struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub is_dir: bool,
    pub encrypted: bool,
    /// Declared uncompressed size.
    pub size: u64,
}

impl EntryInfo {
    pub fn read<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Result<Self, ZipError> {
        let file = archive.by_index_raw(index)?;
        Ok(Self {
            index,
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            encrypted: file.encrypted(),
            size: file.size(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Content(Vec<u8>),
    /// Retryable: try the next candidate.
    WrongPassword,
    /// More than the configured limit was inflated.
    TooLarge,
}

/// Open and fully read entry `index`, decrypting with `password` when the entry is encrypted.
///
/// `Err` is reserved for faults unrelated to the password.
pub(crate) fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry: &EntryInfo,
    password: Option<&str>,
    max_size: Option<u64>,
) -> Result<Outcome, ZipError> {
    let opened = match (entry.encrypted, password) {
        (true, Some(password)) => archive.by_index_decrypt(entry.index, password.as_bytes()),
        (true, None) => return Ok(Outcome::WrongPassword),
        (false, _) => archive.by_index(entry.index),
    };
    let mut file = match opened {
        Ok(file) => file,
        Err(ZipError::InvalidPassword) => return Ok(Outcome::WrongPassword),
        Err(err) => return Err(err),
    };

    match read_limited(&mut file, max_size) {
        Ok(Some(content)) => Ok(Outcome::Content(content)),
        // Garbage from a wrong key can inflate past the limit even when the declared size fits.
        Ok(None) if entry.encrypted => Ok(Outcome::WrongPassword),
        Ok(None) => Ok(Outcome::TooLarge),
        Err(err) => classify_read_error(entry, err),
    }
}

/// Map a failed read of entry data to a retryable outcome or a fatal error.
///
/// CRC and AES authentication mismatches arrive as `InvalidData`, a garbled deflate stream as
/// `InvalidInput`.
fn classify_read_error(entry: &EntryInfo, err: io::Error) -> Result<Outcome, ZipError> {
    let wrong_key = matches!(
        err.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
    );
    if entry.encrypted && wrong_key {
        log::trace!("read of encrypted entry {:?} failed: {err}", entry.name);
        return Ok(Outcome::WrongPassword);
    }
    Err(ZipError::Io(err))
}

/// Read to end, or `None` once more than `max` bytes have been produced.
///
/// The declared size is not trusted; the limit is enforced on the inflated stream.
fn read_limited<R: Read>(mut reader: R, max: Option<u64>) -> io::Result<Option<Vec<u8>>> {
    let mut out = Vec::new();
    let Some(max) = max else {
        reader.read_to_end(&mut out)?;
        return Ok(Some(out));
    };
    reader
        .take(max.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > max {
        return Ok(None);
    }
    Ok(Some(out))
}
