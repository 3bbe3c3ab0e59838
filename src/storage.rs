//! Upload storage adapter
//!
//! Uploads and derived outputs live side by side in a single flat directory.
//! Names come from the client, so every name passes through
//! [`sanitize_filename`] before it touches the filesystem.

use crate::error::{PhotoError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use unicode_normalization::UnicodeNormalization;

/// A file written inside the upload root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Absolute or root-relative location of the file
    pub path: PathBuf,
    /// MIME type implied by the file extension
    pub mime: String,
}

impl StoredFile {
    fn new(path: PathBuf) -> Self {
        let mime = mime_for_path(&path).to_string();
        Self { path, mime }
    }

    /// Final path component as UTF-8
    ///
    /// Stored names are produced by [`sanitize_filename`] and are always ASCII.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

/// MIME type for a path, based on its extension
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Reduce a client supplied filename to a safe flat name
///
/// The name is NFKD normalised and anything left outside ASCII is dropped,
/// so `fotö.png` becomes `foto.png`. `/` turns into a space and whitespace
/// runs collapse to `_`. Backslashes are not separators and are simply
/// removed with everything else outside `[A-Za-z0-9_.-]`. Leading and
/// trailing `.` and `_` are stripped last.
///
/// # Errors
/// - `InvalidFilename` when nothing survives sanitisation
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();

    let joined = ascii
        .split(is_separator_whitespace)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let sanitized: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = sanitized.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return Err(PhotoError::InvalidFilename(filename.to_string()));
    }

    Ok(trimmed.to_string())
}

// ASCII whitespace plus vertical tab and the information separators
fn is_separator_whitespace(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '\x0b' | '\x1c'..='\x1f')
}

/// Flat directory holding uploads and transform outputs
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    unique_names: bool,
}

impl UploadStore {
    /// Create a store rooted at `root`
    ///
    /// With `unique_names` every stored upload gets a random token prefix,
    /// otherwise a later upload with the same name overwrites the earlier one.
    pub fn new<P: Into<PathBuf>>(root: P, unique_names: bool) -> Self {
        Self {
            root: root.into(),
            unique_names,
        }
    }

    /// Upload root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload root if it does not exist
    ///
    /// # Errors
    /// - The directory cannot be created
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| PhotoError::file_io_error("create upload directory", &self.root, &e))?;
        debug!(root = %self.root.display(), "upload root ready");
        Ok(())
    }

    /// Sanitise `filename` and write `bytes` under it
    ///
    /// # Errors
    /// - `InvalidFilename` when the name sanitises to nothing
    /// - Write failures
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn store(&self, bytes: &[u8], filename: &str) -> Result<StoredFile> {
        let sanitized = sanitize_filename(filename)?;
        let name = if self.unique_names {
            format!("{}_{sanitized}", uuid::Uuid::new_v4().simple())
        } else {
            sanitized
        };
        self.write_derived(&name, bytes)
    }

    /// Write `bytes` under an already sanitised name
    ///
    /// # Errors
    /// - Write failures
    pub fn write_derived(&self, name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let path = self.root.join(name);
        std::fs::write(&path, bytes).map_err(|e| PhotoError::file_io_error("write", &path, &e))?;
        debug!(path = %path.display(), size = bytes.len(), "stored file");
        Ok(StoredFile::new(path))
    }
}
