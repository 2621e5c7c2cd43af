/// Content hashes already seen during one caller's unpack session.
///
/// The set is owned by the caller and threaded through every decoder/unpacker it runs, so nested
/// containers share it. Hashes keep their first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateSet {
    hashes: Vec<String>,
}

impl DuplicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.iter().any(|h| h == hash)
    }

    /// Record `hash`. Returns `false` if it was already known.
    pub fn record(&mut self, hash: String) -> bool {
        if self.contains(&hash) {
            return false;
        }
        self.hashes.push(hash);
        true
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hashes.iter().map(String::as_str)
    }
}

impl FromIterator<String> for DuplicateSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for hash in iter {
            set.record(hash);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Artifact;

    #[test]
    fn second_identical_artifact_is_marked_duplicate() {
        let mut known = DuplicateSet::new();
        let mut first = Artifact::new("a/x.bin", b"payload".to_vec());
        let mut second = Artifact::new("b/y.bin", b"payload".to_vec());

        assert!(!first.check_duplicate(&mut known));
        assert!(second.check_duplicate(&mut known));
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn failed_artifacts_do_not_touch_the_set() {
        let mut known = DuplicateSet::new();
        let mut failed = Artifact::failed("x", "Error decrypting file");
        assert!(!failed.check_duplicate(&mut known));
        assert!(known.is_empty());
    }

    #[test]
    fn preseeded_hashes_count_as_known() {
        let artifact = Artifact::new("x", b"abc".to_vec());
        let mut known: DuplicateSet = artifact.sha256().into_iter().collect();
        let mut again = artifact.clone();
        assert!(again.check_duplicate(&mut known));
        assert_eq!(known.iter().count(), 1);
    }
}
