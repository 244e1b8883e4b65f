//! Package version lookup

use std::path::Path;

/// Error reading a manifest
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Manifest has no [package] version")]
    Missing,
}

/// Read the `[package].version` entry of a Cargo manifest.
///
/// An empty version string is reported as `0.0.0`.
pub fn package_version(file: impl AsRef<Path>) -> Result<String, VersionError> {
    let content = std::fs::read_to_string(file)?;
    let manifest: toml::Value = toml::from_str(&content)?;

    let version = manifest
        .get("package")
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str())
        .ok_or(VersionError::Missing)?;

    if version.is_empty() {
        Ok("0.0.0".to_string())
    } else {
        Ok(version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reads_package_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        std::fs::write(&path, "[package]\nname = \"demo\"\nversion = \"1.4.2\"\n").unwrap();

        assert_eq!(package_version(&path).unwrap(), "1.4.2");
    }

    #[test]
    fn test_empty_version_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        std::fs::write(&path, "[package]\nname = \"demo\"\nversion = \"\"\n").unwrap();

        assert_eq!(package_version(&path).unwrap(), "0.0.0");
    }

    #[test]
    fn test_missing_package_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        std::fs::write(&path, "[workspace]\nmembers = []\n").unwrap();

        assert!(matches!(package_version(&path), Err(VersionError::Missing)));
    }

    #[test]
    fn test_crate_manifest() {
        let version = package_version(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml")).unwrap();
        assert_eq!(version, crate::VERSION);
    }
}
