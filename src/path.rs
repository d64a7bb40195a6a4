//! Path to object-key normalization
//!
//! Callers may use either `/` or `\` as separators. Keys in the store use a
//! single configured separator and never start with it; the empty key is the
//! bucket root.

/// Default key separator
pub const DEFAULT_SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNormalizer {
    separator: char,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl KeyNormalizer {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Convert a caller path to a backend key
    pub fn normalize(&self, path: &str) -> String {
        let key: String = path
            .chars()
            .map(|c| {
                if c == '/' || c == '\\' {
                    self.separator
                } else {
                    c
                }
            })
            .collect();

        key.trim_start_matches(self.separator).to_string()
    }

    /// Last non-empty segment of a key ("" for the root)
    pub fn base_name<'a>(&self, key: &'a str) -> &'a str {
        key.trim_end_matches(self.separator)
            .rsplit(self.separator)
            .next()
            .unwrap_or("")
    }

    /// Listing prefix for the children of `key`
    pub fn dir_prefix(&self, key: &str) -> String {
        if key.is_empty() || key.ends_with(self.separator) {
            key.to_string()
        } else {
            format!("{}{}", key, self.separator)
        }
    }
}
