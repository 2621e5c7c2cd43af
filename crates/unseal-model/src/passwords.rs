//! Password dictionary sources.

use std::collections::HashSet;
use std::io::{self, BufRead};

/// Passwords commonly used to protect malware samples in transit.
const DEFAULT_WORDS: &[&str] = &["infected", "malware", "virus", "password", "1234", "sample"];

/// An ordered, finite sequence of candidate passwords.
pub trait PasswordSource {
    fn passwords(&self) -> Box<dyn Iterator<Item = String> + '_>;
}

/// A fixed, ordered word list. Repeated words are kept once, at their first position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordList {
    words: Vec<String>,
}

impl Default for WordList {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS.iter().copied())
    }
}

impl WordList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: first_seen(words.into_iter().map(Into::into)),
        }
    }

    /// An empty list; bruteforce never runs.
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    /// Read one password per line. Blank lines and lines starting with `#` are skipped; other
    /// lines are kept verbatim (minus the line terminator) so passwords with spaces survive.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut words = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            words.push(line.to_string());
        }
        Ok(Self {
            words: first_seen(words),
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn first_seen(words: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .into_iter()
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

impl PasswordSource for WordList {
    fn passwords(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.words.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_list_starts_with_infected() {
        let list = WordList::default();
        assert_eq!(list.passwords().next().as_deref(), Some("infected"));
    }

    #[test]
    fn from_reader_skips_comments_and_blank_lines() {
        let input = "# header\ninfected\r\n\nwith space\n#x\nlast";
        let list = WordList::from_reader(Cursor::new(input)).expect("read list");
        let words: Vec<_> = list.passwords().collect();
        assert_eq!(words, vec!["infected", "with space", "last"]);
    }

    #[test]
    fn repeated_words_keep_their_first_position() {
        let list = WordList::new(["b", "a", "b", "c", "a"]);
        assert_eq!(list.len(), 3);
        let words: Vec<_> = list.passwords().collect();
        assert_eq!(words, vec!["b", "a", "c"]);

        let read = WordList::from_reader(Cursor::new("x\ny\nx\n")).expect("read list");
        assert_eq!(read.passwords().collect::<Vec<_>>(), vec!["x", "y"]);
    }
}
