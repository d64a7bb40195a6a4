//! Filesystem-visible metadata for objects and pseudo-directories
//!
//! Directories don't exist in the store; they are inferred from the bucket
//! root (the empty key) and from common key prefixes. They are modelled as a
//! separate variant so their placeholder size never mixes with real object
//! sizes.

use std::cmp::Ordering;
use std::time::SystemTime;

use crate::path::KeyNormalizer;
use crate::store::ObjectInfo;

/// Size reported for every pseudo-directory
pub const PSEUDO_DIR_SIZE: u64 = 42;

/// Default permission bits (rwxr-xr-x)
pub const DEFAULT_MODE: u32 = 0o755;

/// Directory bit added to the mode of pseudo-directories
pub const MODE_DIR: u32 = libc::S_IFDIR as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A materialized object
    Object {
        size: u64,
        etag: Option<String>,
        content_type: Option<String>,
    },
    /// A directory inferred from a key prefix
    PseudoDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    name: String,
    modified: SystemTime,
    /// Permission bits only; the directory bit is added by `mode()`
    permissions: u32,
    kind: EntryKind,
}

impl FileMetadata {
    /// Build metadata from an object record. The empty key is the bucket root.
    pub fn from_object(info: &ObjectInfo, default_mode: u32) -> Self {
        Self::from_object_with(info, default_mode, &KeyNormalizer::default())
    }

    pub fn from_object_with(info: &ObjectInfo, default_mode: u32, keys: &KeyNormalizer) -> Self {
        let permissions = info.mode.unwrap_or(default_mode) & 0o7777;
        let name = keys.base_name(&info.key).to_string();

        if info.key.is_empty() {
            return Self {
                name,
                modified: info.last_modified,
                permissions,
                kind: EntryKind::PseudoDirectory,
            };
        }

        Self {
            name,
            modified: info.last_modified,
            permissions,
            kind: EntryKind::Object {
                size: info.size,
                etag: info.etag.clone(),
                content_type: info.content_type.clone(),
            },
        }
    }

    /// Metadata for a directory inferred from `prefix`
    pub fn pseudo_directory(prefix: &str, modified: SystemTime, mode: u32) -> Self {
        Self::pseudo_directory_with(prefix, modified, mode, &KeyNormalizer::default())
    }

    pub fn pseudo_directory_with(
        prefix: &str,
        modified: SystemTime,
        mode: u32,
        keys: &KeyNormalizer,
    ) -> Self {
        Self {
            name: keys.base_name(prefix).to_string(),
            modified,
            permissions: mode & 0o7777,
            kind: EntryKind::PseudoDirectory,
        }
    }

    /// Base name of the entry ("" for the bucket root)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::Object { size, .. } => *size,
            EntryKind::PseudoDirectory => PSEUDO_DIR_SIZE,
        }
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::PseudoDirectory)
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// File mode, including the directory bit for pseudo-directories
    pub fn mode(&self) -> u32 {
        if self.is_dir() {
            MODE_DIR | self.permissions
        } else {
            self.permissions
        }
    }

    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    pub fn etag(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Object { etag, .. } => etag.as_deref(),
            EntryKind::PseudoDirectory => None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Object { content_type, .. } => content_type.as_deref(),
            EntryKind::PseudoDirectory => None,
        }
    }

    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Sort entries by base name
pub fn sort_by_name(entries: &mut [FileMetadata]) {
    entries.sort_by(FileMetadata::cmp_by_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn info(key: &str, size: u64) -> ObjectInfo {
        ObjectInfo::new(key, size, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
    }

    #[test]
    fn test_real_object() {
        let meta = FileMetadata::from_object(&info("dir/sub/report.csv", 1234), DEFAULT_MODE);
        assert_eq!(meta.name(), "report.csv");
        assert_eq!(meta.size(), 1234);
        assert!(!meta.is_dir());
        assert_eq!(meta.mode(), 0o755);
        assert_eq!(
            meta.modified(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000)
        );
    }

    #[test]
    fn test_bucket_root_is_pseudo_directory() {
        let meta = FileMetadata::from_object(&info("", 987_654), DEFAULT_MODE);
        assert!(meta.is_dir());
        assert_eq!(meta.size(), PSEUDO_DIR_SIZE);
        assert_eq!(meta.mode(), MODE_DIR | 0o755);
        assert_eq!(meta.kind(), &EntryKind::PseudoDirectory);
    }

    #[test]
    fn test_zero_sized_object_stays_zero() {
        let meta = FileMetadata::from_object(&info("empty", 0), DEFAULT_MODE);
        assert_eq!(meta.size(), 0);
        assert!(meta.is_file());
    }

    #[test]
    fn test_stored_mode_wins() {
        let mut object = info("script.sh", 10);
        object.mode = Some(0o100644);
        let meta = FileMetadata::from_object(&object, DEFAULT_MODE);
        assert_eq!(meta.mode(), 0o644);
    }

    #[test]
    fn test_pseudo_directory_from_prefix() {
        let meta = FileMetadata::pseudo_directory("a/b/", SystemTime::UNIX_EPOCH, 0o700);
        assert_eq!(meta.name(), "b");
        assert!(meta.is_dir());
        assert_eq!(meta.size(), PSEUDO_DIR_SIZE);
        assert_eq!(meta.etag(), None);
    }

    #[test]
    fn test_backslash_separator_name() {
        let keys = KeyNormalizer::new('\\');
        let meta = FileMetadata::from_object_with(&info("a\\b\\c.txt", 1), DEFAULT_MODE, &keys);
        assert_eq!(meta.name(), "c.txt");
    }

    #[test]
    fn test_sort_by_name() {
        let mut entries = vec![
            FileMetadata::from_object(&info("z", 1), DEFAULT_MODE),
            FileMetadata::pseudo_directory("m/", SystemTime::UNIX_EPOCH, DEFAULT_MODE),
            FileMetadata::from_object(&info("a", 1), DEFAULT_MODE),
        ];
        sort_by_name(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }
}
