//! # Input Validation Utilities
//!
//! Syntax checks shared by the publish workflow and the storage layer:
//!
//! - package names (`[A-Za-z_][A-Za-z0-9_]*`, at most 64 characters)
//! - version strings (three or more dot-separated segments, permissive suffixes)
//! - blob keys, which must be safe relative paths before touching the filesystem
//!
//! ```rust
//! use repub_server::validation::{validate_package_name, validate_version};
//!
//! assert!(validate_package_name("http_client").is_ok());
//! assert!(validate_version("1.2.0-dev.1+42").is_ok());
//! assert!(validate_version("1.2").is_err());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Default maximum archive upload size (32 MB)
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: usize = 32;

/// Maximum allowed number of multipart fields
pub const MAX_MULTIPART_FIELDS: usize = 10;

/// Maximum allowed package name length
pub const MAX_PACKAGE_NAME_LENGTH: usize = 64;

/// Maximum allowed path depth for blob keys
pub const MAX_PATH_DEPTH: usize = 10;

static PACKAGE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid package name regex pattern")
});

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid package name format: {0}")]
    PackageName(String),

    #[error("invalid version format: {0}")]
    Version(String),

    #[error("Path contains null bytes")]
    NullBytes,

    #[error("Path contains control characters")]
    ControlCharacters,

    #[error("Absolute paths are not allowed: {path}")]
    AbsolutePath { path: String },

    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("Path too deep: {actual} components (max {max})")]
    PathTooDeep { actual: usize, max: usize },

    #[error("Path is empty")]
    EmptyPath,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a package name.
///
/// Names start with a letter or underscore, continue with letters, digits or
/// underscores, and are at most [`MAX_PACKAGE_NAME_LENGTH`] characters long.
pub fn validate_package_name(name: &str) -> ValidationResult<()> {
    if name.len() > MAX_PACKAGE_NAME_LENGTH || !PACKAGE_NAME_REGEX.is_match(name) {
        return Err(ValidationError::PackageName(name.to_string()));
    }
    Ok(())
}

/// Validate a version string.
///
/// Deliberately not a semver parser: the string needs at least three
/// dot-separated, non-empty segments, each starting with a digit unless it
/// carries a `-` pre-release or `+` build suffix. Only ASCII letters, digits,
/// `.`, `-` and `+` are accepted, the version ends up as a URL path segment
/// and in blob keys.
pub fn validate_version(version: &str) -> ValidationResult<()> {
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(ValidationError::Version(version.to_string()));
    }

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 3 {
        return Err(ValidationError::Version(version.to_string()));
    }

    for part in parts {
        if part.is_empty() {
            return Err(ValidationError::Version(version.to_string()));
        }
        if part.contains('-') || part.contains('+') {
            continue;
        }
        if !part.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ValidationError::Version(version.to_string()));
        }
    }

    Ok(())
}

/// Validate that a storage key is a safe relative path.
///
/// Rejects null bytes, control characters, absolute paths, `..` components and
/// overly deep paths. Returns the key as a [`PathBuf`] on success.
pub fn validate_safe_path<P: AsRef<Path>>(path: P) -> ValidationResult<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if path_str.is_empty() {
        return Err(ValidationError::EmptyPath);
    }

    if path_str.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if path_str.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    if path.is_absolute() || path_str.starts_with('\\') {
        return Err(ValidationError::AbsolutePath {
            path: path_str.to_string(),
        });
    }

    // Version strings may contain dots, so only whole `..` segments count
    if path_str.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ValidationError::PathTraversal {
            path: path_str.to_string(),
        });
    }

    let depth = path.components().count();
    if depth > MAX_PATH_DEPTH {
        return Err(ValidationError::PathTooDeep {
            actual: depth,
            max: MAX_PATH_DEPTH,
        });
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_package_names() {
        for name in ["pkgA", "test_package", "_private", "a", "http2"] {
            assert!(validate_package_name(name).is_ok(), "{name} should be valid");
        }
        assert!(validate_package_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_invalid_package_names() {
        for name in ["", "1package", "my-package", "my.package", "pkg name", "ünï"] {
            assert!(
                validate_package_name(name).is_err(),
                "{name} should be invalid"
            );
        }
        assert!(validate_package_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_package_name_error_message() {
        let err = validate_package_name("bad-name").unwrap_err();
        assert_eq!(err.to_string(), "invalid package name format: bad-name");
    }

    #[test]
    fn test_valid_versions() {
        for version in [
            "1.0.0",
            "0.0.1",
            "1.0.0-beta",
            "1.0.0+build",
            "1.0.0-beta.1+build.2",
            "10.20.30",
            "1.2.3.4",
        ] {
            assert!(validate_version(version).is_ok(), "{version} should be valid");
        }
    }

    #[test]
    fn test_invalid_versions() {
        for version in ["", "1", "1.0", "v1.0.0", "1..0", "1.0.", "a.b.c", "1.x.0"] {
            assert!(validate_version(version).is_err(), "{version} should be invalid");
        }
    }

    #[test]
    fn test_version_suffix_charset() {
        for version in [
            "1.0.0-a/b",
            "1.0.0-a b",
            "1.0.0+x\\y",
            "1.0.0-a?b",
            "1.0.0-%2F",
            "1.0.0-\u{e9}",
            "1.0.0-a\tb",
        ] {
            assert!(validate_version(version).is_err(), "{version:?} should be invalid");
        }
        assert!(validate_version("1.0.0-rc.1+sha.5114f85").is_ok());
    }

    #[test]
    fn test_version_error_message() {
        let err = validate_version("1.0").unwrap_err();
        assert_eq!(err.to_string(), "invalid version format: 1.0");
    }

    #[test]
    fn test_validate_safe_path() {
        assert!(validate_safe_path("pkgA/1.0.0/pkgA-1.0.0.tar.gz").is_ok());
        assert!(validate_safe_path("pkgA/1.0.0-rc.1/pkgA-1.0.0-rc.1.tar.gz").is_ok());

        assert_eq!(validate_safe_path(""), Err(ValidationError::EmptyPath));
        assert_eq!(
            validate_safe_path("pkg\0name"),
            Err(ValidationError::NullBytes)
        );
        assert_eq!(
            validate_safe_path("pkg\nname"),
            Err(ValidationError::ControlCharacters)
        );
        assert!(matches!(
            validate_safe_path("/etc/passwd"),
            Err(ValidationError::AbsolutePath { .. })
        ));
        assert!(matches!(
            validate_safe_path("pkgA/../../etc/passwd"),
            Err(ValidationError::PathTraversal { .. })
        ));
        assert!(matches!(
            validate_safe_path("a/b/c/d/e/f/g/h/i/j/k"),
            Err(ValidationError::PathTooDeep { .. })
        ));
    }
}
