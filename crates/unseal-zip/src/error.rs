use std::io;

use zip::result::ZipError;

/// Faults that abort a whole unpack.
///
/// Wrong passwords never show up here: an entry no candidate opens becomes a `failed` artifact.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("cannot open zip archive: {0}")]
    Archive(#[source] ZipError),
    #[error("cannot read zip entry {name:?}: {source}")]
    Entry {
        name: String,
        #[source]
        source: ZipError,
    },
}
