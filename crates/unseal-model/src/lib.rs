//! Shared data model for recovering plaintext from password-protected containers.
//!
//! This crate holds the pieces every decoder and unpacker agree on:
//! - the artifact tree ([`Artifact`], [`Directory`], [`Node`])
//! - the caller-owned [`DuplicateSet`] used for duplicate-content detection
//! - collaborator interfaces: [`SignatureRegistry`], [`PasswordSource`], [`Decoder`], [`Unpacker`]

mod artifact;
mod duplicates;
mod interfaces;
mod passwords;
mod registry;

pub use crate::artifact::{split_archive_path, Artifact, Directory, Mode, Node};
pub use crate::duplicates::DuplicateSet;
pub use crate::interfaces::{Decoded, Decoder, Source, Unpacker};
pub use crate::passwords::{PasswordSource, WordList};
pub use crate::registry::{ContainerFormat, SignatureRegistry, Signatures, OLE_MAGIC};
