//! OLE/CFB access: probing and stream lookup.

use std::io::{self, Cursor, Read};
use std::path::PathBuf;

use unseal_model::OLE_MAGIC;

pub const ENCRYPTION_INFO_STREAM: &str = "EncryptionInfo";
pub const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

pub(crate) type Ole<'a> = cfb::CompoundFile<Cursor<&'a [u8]>>;

/// Open `bytes` as a compound document, or `None` if it is not one.
pub(crate) fn open(bytes: &[u8]) -> Option<Ole<'_>> {
    if !bytes.starts_with(&OLE_MAGIC) {
        return None;
    }
    match cfb::CompoundFile::open(Cursor::new(bytes)) {
        Ok(ole) => Some(ole),
        Err(err) => {
            log::debug!("OLE signature present but container is unreadable: {err}");
            None
        }
    }
}

/// Find a root-level stream by name, falling back to a case-insensitive match.
fn resolve_stream(ole: &Ole<'_>, name: &str) -> Option<PathBuf> {
    if ole.is_stream(name) {
        return Some(PathBuf::from(name));
    }
    ole.walk()
        .filter(|entry| entry.is_stream())
        .map(|entry| entry.path().to_path_buf())
        .find(|path| {
            path.to_string_lossy()
                .trim_start_matches('/')
                .eq_ignore_ascii_case(name)
        })
}

/// Read a whole stream; `Ok(None)` if the container has no such stream.
pub(crate) fn read_stream(ole: &mut Ole<'_>, name: &str) -> io::Result<Option<Vec<u8>>> {
    let Some(path) = resolve_stream(ole, name) else {
        return Ok(None);
    };
    let mut stream = ole.open_stream(&path)?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out)?;
    Ok(Some(out))
}

/// Cheap probe: an OLE container carrying both Agile encryption streams.
pub fn is_encrypted_office(bytes: &[u8]) -> bool {
    let Some(ole) = open(bytes) else {
        return false;
    };
    resolve_stream(&ole, ENCRYPTION_INFO_STREAM).is_some()
        && resolve_stream(&ole, ENCRYPTED_PACKAGE_STREAM).is_some()
}
