//! Zip unpacker with password recovery.
//!
//! Every entry is tried, in order, with the caller's password, then with passwords that already
//! opened earlier entries of the same archive (the session cache), then with the dictionary.
//! Entries nothing opens come back as `failed` artifacts so the rest of the archive is still
//! returned; only structural faults abort the unpack.

mod entry;
mod error;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::time::{Duration, Instant};

use unseal_model::{
    split_archive_path, Artifact, ContainerFormat, Directory, DuplicateSet, Node, PasswordSource,
    SignatureRegistry, Signatures, Source, Unpacker, WordList,
};
use zip::ZipArchive;

use crate::entry::{read_entry, EntryInfo, Outcome};

pub use crate::error::UnpackError;

/// Description on entries no candidate password opened.
pub const DECRYPT_FAILED: &str = "Error decrypting file";
/// Description on entries whose inflated size exceeds [`UnpackOptions::max_entry_size`].
pub const ENTRY_TOO_LARGE: &str = "Entry exceeds size limit";
/// Default per-entry inflate limit.
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024; // 256MiB

/// Limits applied per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Maximum passwords tried for one entry (supplied, cached and dictionary combined).
    pub max_attempts: Option<usize>,
    /// Wall-clock budget for one entry's password search.
    pub time_budget: Option<Duration>,
    /// Entries that inflate past this many bytes become `failed` artifacts.
    pub max_entry_size: Option<u64>,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            max_attempts: None,
            time_budget: None,
            max_entry_size: Some(DEFAULT_MAX_ENTRY_SIZE),
        }
    }
}

/// Unpacks zip archives, bruteforcing encrypted entries from `P`.
#[derive(Debug, Clone)]
pub struct ZipUnpacker<P = WordList> {
    passwords: P,
    options: UnpackOptions,
    signatures: Signatures,
    /// Passwords that opened an entry during the current `unpack` call, in discovery order.
    session: Vec<String>,
}

impl Default for ZipUnpacker<WordList> {
    fn default() -> Self {
        Self::new(WordList::default(), UnpackOptions::default())
    }
}

impl<P: PasswordSource> ZipUnpacker<P> {
    pub fn new(passwords: P, options: UnpackOptions) -> Self {
        Self {
            passwords,
            options,
            signatures: Signatures::default(),
            session: Vec::new(),
        }
    }

    pub fn options(&self) -> &UnpackOptions {
        &self.options
    }

    /// Passwords that opened entries during the most recent `unpack`.
    pub fn known_passwords(&self) -> &[String] {
        &self.session
    }

    fn extract<R: std::io::Read + std::io::Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        entry: &EntryInfo,
        supplied: Option<&str>,
    ) -> Result<Artifact, UnpackError> {
        let max_size = self.options.max_entry_size;
        if max_size.is_some_and(|max| entry.size > max) {
            log::warn!("zip entry {:?} declares {} bytes; over the limit", entry.name, entry.size);
            return Ok(Artifact::failed(&entry.name, ENTRY_TOO_LARGE));
        }

        let fault = |source| UnpackError::Entry {
            name: entry.name.clone(),
            source,
        };

        if !entry.encrypted {
            return match read_entry(archive, entry, None, max_size).map_err(fault)? {
                Outcome::Content(content) => Ok(Artifact::new(&entry.name, content)),
                Outcome::TooLarge => {
                    log::warn!("zip entry {:?} inflated past the limit", entry.name);
                    Ok(Artifact::failed(&entry.name, ENTRY_TOO_LARGE))
                }
                Outcome::WrongPassword => Ok(Artifact::failed(&entry.name, DECRYPT_FAILED)),
            };
        }

        let started = Instant::now();
        let cached = self.session.clone();
        let candidates = supplied
            .filter(|password| !password.is_empty())
            .map(str::to_string)
            .into_iter()
            .chain(cached)
            .chain(self.passwords.passwords());

        let mut tried: HashSet<String> = HashSet::new();
        let mut attempts = 0usize;
        let mut found = None;
        for candidate in candidates {
            if tried.contains(&candidate) {
                continue;
            }
            if self.options.max_attempts.is_some_and(|max| attempts >= max) {
                log::debug!("attempt budget spent on {:?}", entry.name);
                break;
            }
            if self.options.time_budget.is_some_and(|budget| started.elapsed() >= budget) {
                log::debug!("time budget spent on {:?}", entry.name);
                break;
            }

            attempts += 1;
            match read_entry(archive, entry, Some(candidate.as_str()), max_size).map_err(fault)? {
                Outcome::Content(content) => {
                    found = Some((candidate, content));
                    break;
                }
                Outcome::TooLarge => {
                    log::warn!("zip entry {:?} inflated past the limit", entry.name);
                    return Ok(Artifact::failed(&entry.name, ENTRY_TOO_LARGE));
                }
                Outcome::WrongPassword => {
                    tried.insert(candidate);
                }
            }
        }

        let Some((password, content)) = found else {
            log::warn!(
                "no password opened zip entry {:?} after {attempts} attempt(s)",
                entry.name
            );
            return Ok(Artifact::failed(&entry.name, DECRYPT_FAILED));
        };
        log::debug!(
            "zip entry {:?} opened after {} failed attempt(s)",
            entry.name,
            attempts.saturating_sub(1)
        );
        if !self.session.contains(&password) {
            self.session.push(password.clone());
        }
        Ok(Artifact::new(&entry.name, content).with_password(&password))
    }
}

impl<P: PasswordSource> Unpacker for ZipUnpacker<P> {
    type Error = UnpackError;

    fn name(&self) -> &'static str {
        "zip"
    }

    fn handles(&self, source: Source<'_>) -> bool {
        match source {
            Source::Bytes(bytes) => self.signatures.identify(bytes) == Some(ContainerFormat::Zip),
            Source::Path(path) => {
                let Ok(file) = File::open(path) else {
                    return false;
                };
                let ok = ZipArchive::new(BufReader::new(file)).is_ok();
                log::debug!("zip structural probe of {}: {ok}", path.display());
                ok
            }
        }
    }

    fn unpack(
        &mut self,
        source: Source<'_>,
        password: Option<&str>,
        duplicates: &mut DuplicateSet,
    ) -> Result<Directory, UnpackError> {
        self.session.clear();
        let bytes = source.bytes()?;
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_ref())).map_err(UnpackError::Archive)?;
        log::debug!("unpacking zip with {} entries", archive.len());

        let mut root = Directory::root();
        for index in 0..archive.len() {
            let entry = EntryInfo::read(&mut archive, index).map_err(|source| UnpackError::Entry {
                name: format!("#{index}"),
                source,
            })?;
            let (mut parents, name) = split_archive_path(&entry.name);

            if entry.is_dir {
                if !name.is_empty() {
                    parents.push(name);
                }
                root.ensure_path(&parents);
                continue;
            }
            if name.is_empty() {
                log::debug!("skipping zip entry with empty name {:?}", entry.name);
                continue;
            }

            let mut artifact = self.extract(&mut archive, &entry, password)?;
            artifact.check_duplicate(duplicates);
            root.insert(&parents, Node::File(artifact));
        }
        Ok(root)
    }
}
