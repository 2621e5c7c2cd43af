//! Byte-signature lookup used by detection probes.

/// Container families a decoder or unpacker may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Zip local-file, empty-archive, or spanned-archive signature.
    Zip,
    /// OLE/CFB compound document (the wrapper used by encrypted Office files).
    CompoundDocument,
}

/// Maps the leading bytes of a blob to the container format a decoder should attempt.
pub trait SignatureRegistry {
    fn identify(&self, bytes: &[u8]) -> Option<ContainerFormat>;
}

pub static OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Built-in signature table.
#[derive(Debug, Clone)]
pub struct Signatures {
    table: Vec<(&'static [u8], ContainerFormat)>,
}

impl Default for Signatures {
    fn default() -> Self {
        Self {
            table: vec![
                (&b"PK\x03\x04"[..], ContainerFormat::Zip),
                (&b"PK\x05\x06"[..], ContainerFormat::Zip),
                (&b"PK\x07\x08"[..], ContainerFormat::Zip),
                (&OLE_MAGIC[..], ContainerFormat::CompoundDocument),
            ],
        }
    }
}

impl Signatures {
    /// Add a signature; later registrations are checked after the built-in ones.
    pub fn register(&mut self, prefix: &'static [u8], format: ContainerFormat) {
        self.table.push((prefix, format));
    }
}

impl SignatureRegistry for Signatures {
    fn identify(&self, bytes: &[u8]) -> Option<ContainerFormat> {
        let found = self
            .table
            .iter()
            .find(|(prefix, _)| bytes.starts_with(prefix))
            .map(|(_, format)| *format);
        log::trace!("signature lookup over {} bytes: {found:?}", bytes.len());
        found
    }
}
