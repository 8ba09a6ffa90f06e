//! Caller-facing dataset identifiers.
//!
//! Clients never hand the service a filesystem path. They name a dataset, the
//! name is checked against a small character set and then resolved inside the
//! configured data directory.

use crate::error::{Result, ServiceError};
use std::fmt;
use std::path::{Path, PathBuf};

const CSV_EXTENSION: &str = ".csv";
const MAX_NAME_LEN: usize = 128;

/// Validated file name of a CSV dataset, always ending in `.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetName(String);

impl DatasetName {
    /// Accepts `data` or `data.csv`. Path separators, parent references,
    /// leading dots and anything outside `[A-Za-z0-9_.-]` are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || ServiceError::InvalidDataset(raw.to_string());

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN || trimmed.starts_with('.') {
            return Err(invalid());
        }
        if trimmed.contains("..") {
            return Err(invalid());
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(invalid());
        }

        let name = if trimmed.to_ascii_lowercase().ends_with(CSV_EXTENSION) {
            trimmed.to_string()
        } else {
            format!("{trimmed}{CSV_EXTENSION}")
        };
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps dataset names onto files below one directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the dataset would live at, without touching the filesystem.
    pub fn path_of(&self, name: &DatasetName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Resolves an existing dataset and checks that, after following symlinks,
    /// it still lives inside the data directory.
    pub fn resolve_existing(&self, name: &DatasetName) -> Result<PathBuf> {
        let candidate = self.path_of(name);
        if !candidate.exists() {
            return Err(ServiceError::DatasetNotFound(name.to_string()));
        }
        let root = self.root.canonicalize()?;
        let resolved = candidate.canonicalize()?;
        if !resolved.starts_with(&root) {
            return Err(ServiceError::OutsideDataDir(name.to_string()));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn appends_csv_extension() {
        assert_eq!(DatasetName::parse("data").unwrap().as_str(), "data.csv");
        assert_eq!(DatasetName::parse("data.csv").unwrap().as_str(), "data.csv");
        assert_eq!(
            DatasetName::parse("postalCodeMapping.csv").unwrap().as_str(),
            "postalCodeMapping.csv"
        );
    }

    #[test]
    fn rejects_path_like_names() {
        for raw in [
            "",
            "../data.csv",
            "..",
            "/etc/passwd",
            "sub/data.csv",
            "sub\\data.csv",
            ".hidden.csv",
            "data..csv",
            "C:data.csv",
            "da ta.csv",
        ] {
            assert!(
                matches!(DatasetName::parse(raw), Err(ServiceError::InvalidDataset(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolves_files_inside_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.csv"), "a\n").unwrap();
        let data_dir = DataDir::new(dir.path());
        let name = DatasetName::parse("data").unwrap();
        let resolved = data_dir.resolve_existing(&name).unwrap();
        assert!(resolved.ends_with("data.csv"));
    }

    #[test]
    fn missing_dataset_is_not_found() {
        let dir = tempdir().unwrap();
        let data_dir = DataDir::new(dir.path());
        let name = DatasetName::parse("absent").unwrap();
        assert!(matches!(
            data_dir.resolve_existing(&name),
            Err(ServiceError::DatasetNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_rejected() {
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret.csv");
        fs::write(&secret, "token\nabc\n").unwrap();

        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("link.csv")).unwrap();

        let data_dir = DataDir::new(dir.path());
        let name = DatasetName::parse("link.csv").unwrap();
        assert!(matches!(
            data_dir.resolve_existing(&name),
            Err(ServiceError::OutsideDataDir(_))
        ));
    }
}
