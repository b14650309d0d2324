//! Package archive extraction.
//!
//! Uploaded archives are gzip-compressed tarballs, conventionally rooted at a
//! `{package}-{version}/` directory. Extraction walks the entries once, in
//! order, and pulls out the root `pubspec.yaml` plus optional `README.md` and
//! `CHANGELOG.md` documents.

use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

use crate::error::{AppError, AppResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const MANIFEST_FILE: &str = "pubspec.yaml";
const README_FILE: &str = "readme.md";
const CHANGELOG_FILE: &str = "changelog.md";

/// Documents pulled out of a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    /// Verbatim text of the root `pubspec.yaml`
    pub manifest: String,
    pub readme: Option<String>,
    pub changelog: Option<String>,
}

/// Normalize a tar entry path to its position relative to the package root.
///
/// A leading `./` is dropped, then the first segment is dropped whenever more
/// than one segment remains.
fn package_relative_name(raw: &str) -> &str {
    let name = raw.strip_prefix("./").unwrap_or(raw);
    match name.split_once('/') {
        Some((_, rest)) => rest,
        None => name,
    }
}

/// Final path component of a package-relative name.
fn file_component(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn read_entry<R: Read>(entry: &mut R, what: &str) -> AppResult<String> {
    let mut content = Vec::new();
    entry
        .read_to_end(&mut content)
        .map_err(|e| AppError::ArchiveFormat(format!("failed to read {what}: {e}")))?;
    Ok(String::from_utf8_lossy(&content).into_owned())
}

/// Extract the manifest and optional documents from a `.tar.gz` archive.
///
/// # Errors
///
/// * [`AppError::ArchiveFormat`] if the data is not a readable gzip tar stream
/// * [`AppError::ManifestNotFound`] if no `pubspec.yaml` sits at the package root
pub fn extract(archive: &[u8]) -> AppResult<ExtractedArchive> {
    if !archive.starts_with(&GZIP_MAGIC) {
        return Err(AppError::ArchiveFormat(
            "data is not gzip compressed".to_string(),
        ));
    }

    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| AppError::ArchiveFormat(format!("failed to read tar stream: {e}")))?;

    let mut manifest = None;
    let mut readme = None;
    let mut changelog = None;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| AppError::ArchiveFormat(format!("failed to read tar entry: {e}")))?;

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let raw_path = entry
            .path()
            .map_err(|e| AppError::ArchiveFormat(format!("invalid entry path: {e}")))?
            .to_string_lossy()
            .into_owned();
        let name = package_relative_name(&raw_path);
        let file_name = file_component(name).to_lowercase();

        match file_name.as_str() {
            MANIFEST_FILE => {
                // Only the manifest at the package root counts
                if manifest.is_none() && !name.contains('/') {
                    manifest = Some(read_entry(&mut entry, "pubspec.yaml")?);
                    debug!(entry = %raw_path, "Found package manifest");
                }
            }
            README_FILE => readme = Some(read_entry(&mut entry, "README.md")?),
            CHANGELOG_FILE => changelog = Some(read_entry(&mut entry, "CHANGELOG.md")?),
            _ => {}
        }
    }

    let manifest = manifest.ok_or(AppError::ManifestNotFound)?;

    Ok(ExtractedArchive {
        manifest,
        readme,
        changelog,
    })
}

/// Hex-encoded SHA-256 digest of the archive bytes.
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
