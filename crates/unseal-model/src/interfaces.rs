//! Call surface shared by decoders and unpackers.

use std::borrow::Cow;
use std::io;
use std::path::Path;

use crate::{Artifact, Directory, DuplicateSet};

/// Where a container's bytes come from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

impl<'a> Source<'a> {
    /// Borrow in-memory bytes, or read the file.
    pub fn bytes(&self) -> io::Result<Cow<'a, [u8]>> {
        match *self {
            Source::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Source::Path(path) => std::fs::read(path).map(Cow::Owned),
        }
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Source::Path(path)
    }
}

/// Result of a single-payload decode attempt.
///
/// Neither `NotDecryptable` nor `WrongPassword` is an error: the first means "try another
/// decoder", the second means "try another password".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Artifact(Artifact),
    NotDecryptable { reason: String },
    WrongPassword,
}

impl Decoded {
    pub fn not_decryptable(reason: impl Into<String>) -> Self {
        Decoded::NotDecryptable {
            reason: reason.into(),
        }
    }

    pub fn artifact(self) -> Option<Artifact> {
        match self {
            Decoded::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Decrypts a container wrapping exactly one payload.
pub trait Decoder {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Cheap probe: does this decoder apply to `source` at all?
    fn handles(&self, source: Source<'_>) -> bool;

    fn decode(&self, source: Source<'_>, password: &str) -> Result<Decoded, Self::Error>;
}

/// Expands a multi-entry container into an artifact tree.
pub trait Unpacker {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn handles(&self, source: Source<'_>) -> bool;

    /// Unpack every entry. Entries that cannot be decrypted come back as `failed` artifacts;
    /// only faults unrelated to password correctness are returned as errors.
    fn unpack(
        &mut self,
        source: Source<'_>,
        password: Option<&str>,
        duplicates: &mut DuplicateSet,
    ) -> Result<Directory, Self::Error>;
}
