//! Normalized in-memory tree of extracted content.
//!
//! Unpackers build a [`Directory`] rooted at the container, with one [`Node`] per archive entry.
//! Leaf [`Artifact`]s carry the decrypted bytes (or a `failed` marker and a description); every
//! leaf also records the directory chain it was found under so callers that flatten the tree can
//! still reconstruct the container-internal path.

use sha2::{Digest as _, Sha256};

use crate::duplicates::DuplicateSet;

/// Whether an artifact was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Content could not be recovered; `content` is absent and `description` says why.
    Failed,
}

/// One decoded unit of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    /// Path within the container, `/`-separated, without a leading separator.
    pub relative_path: String,
    /// Directory names from the container root down to this entry.
    pub parent_directories: Vec<String>,
    pub content: Option<Vec<u8>>,
    /// Password that decrypted this artifact. Never set for empty passwords.
    pub password: Option<String>,
    pub mode: Mode,
    pub description: Option<String>,
    pub duplicate: bool,
}

impl Artifact {
    /// Build a recovered artifact from a container-internal path.
    pub fn new(raw_path: &str, content: Vec<u8>) -> Self {
        let (parent_directories, name) = split_archive_path(raw_path);
        let relative_path = join_path(&parent_directories, &name);
        Self {
            name,
            relative_path,
            parent_directories,
            content: Some(content),
            password: None,
            mode: Mode::Normal,
            description: None,
            duplicate: false,
        }
    }

    /// Build a `failed` artifact: no content, a human-readable reason.
    pub fn failed(raw_path: &str, description: impl Into<String>) -> Self {
        let mut artifact = Self::new(raw_path, Vec::new());
        artifact.content = None;
        artifact.mode = Mode::Failed;
        artifact.description = Some(description.into());
        artifact
    }

    /// Record the password that decrypted this artifact.
    ///
    /// Empty passwords are not recorded: an entry that opens with `""` was effectively not
    /// password protected.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = (!password.is_empty()).then(|| password.to_string());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.mode == Mode::Failed
    }

    pub fn size(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }

    /// Lower-case hex SHA-256 of the content, if any.
    pub fn sha256(&self) -> Option<String> {
        let content = self.content.as_ref()?;
        Some(format!("{:x}", Sha256::digest(content)))
    }

    /// Mark this artifact as a duplicate if its hash is already in `known`, otherwise record it.
    ///
    /// Returns the resulting `duplicate` flag. Artifacts without content never touch the set.
    pub fn check_duplicate(&mut self, known: &mut DuplicateSet) -> bool {
        if let Some(hash) = self.sha256() {
            self.duplicate = !known.record(hash);
        }
        self.duplicate
    }
}

/// A node of the artifact tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(Artifact),
    Directory(Directory),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File(artifact) => &artifact.name,
            Node::Directory(dir) => &dir.name,
        }
    }
}

/// A tree node with ordered children and no content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    pub name: String,
    pub relative_path: String,
    pub children: Vec<Node>,
}

impl Directory {
    /// An unnamed container root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            children: Vec::new(),
        }
    }

    pub fn append_child(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Create the directory chain named by `segments` where missing.
    ///
    /// Existing directories are reused so entries that share a prefix end up under the same node;
    /// newly created directories are appended after existing children.
    pub fn ensure_path<S: AsRef<str>>(&mut self, segments: &[S]) {
        self.descend(segments, None);
    }

    /// Append `node` under the directory chain `parents`, creating directories as needed.
    pub fn insert<S: AsRef<str>>(&mut self, parents: &[S], node: Node) {
        self.descend(parents, Some(node));
    }

    fn descend<S: AsRef<str>>(&mut self, segments: &[S], node: Option<Node>) {
        let Some((first, rest)) = segments.split_first() else {
            if let Some(node) = node {
                self.append_child(node);
            }
            return;
        };
        let index = self.child_directory(first.as_ref());
        if let Some(Node::Directory(dir)) = self.children.get_mut(index) {
            dir.descend(rest, node);
        }
    }

    /// Index of the child directory called `name`, appending a new one when there is none.
    ///
    /// A file with the same name does not count; the directory is created next to it.
    fn child_directory(&mut self, name: &str) -> usize {
        let existing = self
            .children
            .iter()
            .position(|child| matches!(child, Node::Directory(d) if d.name == name));
        if let Some(index) = existing {
            return index;
        }
        let relative_path = if self.relative_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.relative_path)
        };
        self.children
            .push(Node::Directory(Directory::new(name, relative_path)));
        self.children.len() - 1
    }

    /// Depth-first list of every leaf artifact in insertion order.
    pub fn files(&self) -> Vec<&Artifact> {
        let mut out = Vec::new();
        collect_files(self, &mut out);
        out
    }

    /// Content of the leaf whose reconstructed path equals `path`.
    ///
    /// `path` goes through the same normalization as archive entry names, so `/a/b` and `a/b`
    /// address the same artifact.
    pub fn read(&self, path: &str) -> Option<&[u8]> {
        let (parents, name) = split_archive_path(path);
        let wanted = join_path(&parents, &name);
        self.files()
            .into_iter()
            .find(|artifact| artifact.relative_path == wanted)
            .and_then(|artifact| artifact.content.as_deref())
    }
}

fn collect_files<'a>(dir: &'a Directory, out: &mut Vec<&'a Artifact>) {
    for child in &dir.children {
        match child {
            Node::File(artifact) => out.push(artifact),
            Node::Directory(sub) => collect_files(sub, out),
        }
    }
}

/// Split a container-internal path into its directory chain and final name.
///
/// Backslashes are treated as separators, and empty or `.` segments are dropped, which also
/// strips a leading root separator: `/absolute/path` becomes `(["absolute"], "path")`. A path
/// with a trailing separator yields its last directory as the name.
pub fn split_archive_path(raw: &str) -> (Vec<String>, String) {
    let normalized = raw.replace('\\', "/");
    let mut segments: Vec<String> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect();
    let name = segments.pop().unwrap_or_default();
    (segments, name)
}

fn join_path(parents: &[String], name: &str) -> String {
    if parents.is_empty() {
        return name.to_string();
    }
    let mut out = parents.join("/");
    if !name.is_empty() {
        out.push('/');
        out.push_str(name);
    }
    out
}
