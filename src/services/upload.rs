//! Upload storage
//!
//! Files are written under `<upload root>/<category>/` with a
//! `<unix nanos>_<sanitized original name>` file name and addressed by their
//! public path `/uploads/<category>/<name>`. The root comes from
//! [`UploadConfig`] and is served statically by the router.
//!
//! Request bodies are streamed into `<upload root>/.staging/` first. A staged
//! file is only moved into its category once it passes the checks in
//! [`UploadStore::save`], and it is unlinked when dropped, so a rejected or
//! half-received part never lingers on disk.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::UploadConfig;

/// URL prefix the upload root is served under
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Attempts at finding a free file name before giving up
const NAME_ATTEMPTS: u32 = 5;

/// Staging directory under the upload root
const STAGING_DIR: &str = ".staging";

/// Subdirectory a file is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Articles,
    Photos,
    Diplomas,
    Videos,
    Files,
}

impl UploadCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            UploadCategory::Articles => "articles",
            UploadCategory::Photos => "photos",
            UploadCategory::Diplomas => "diplomas",
            UploadCategory::Videos => "videos",
            UploadCategory::Files => "files",
        }
    }
}

/// Upload failures
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File '{name}' is too large ({size} bytes, max {max} bytes)")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("File type '{0}' is not allowed")]
    TypeNotAllowed(String),

    #[error("File '{0}' is empty")]
    Empty(String),

    #[error("Path '{0}' is not inside the upload directory")]
    InvalidPath(String),

    #[error("None of the {0} uploaded file(s) could be saved")]
    NothingSaved(usize),

    #[error("Failed to write upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A file part received from a multipart request, held in the staging area
#[derive(Debug)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: String,
    /// Bytes received, counting any past the size limit that were not kept
    pub size: u64,
    staged: TempPath,
}

/// Streams one file part into the staging area.
///
/// Bytes past the size limit are counted but not written, so the part is
/// drained without filling the disk and then rejected by [`UploadStore::save`].
#[derive(Debug)]
pub struct StagedWriter {
    file_name: String,
    content_type: String,
    size: u64,
    max: u64,
    handle: fs::File,
    staged: TempPath,
}

impl StagedWriter {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.size += chunk.len() as u64;
        if self.size <= self.max {
            self.handle.write_all(chunk).await?;
        }
        Ok(())
    }

    pub async fn finish(mut self) -> Result<IncomingFile, UploadError> {
        self.handle.flush().await?;
        Ok(IncomingFile {
            file_name: self.file_name,
            content_type: self.content_type,
            size: self.size,
            staged: self.staged,
        })
    }
}

/// A file written to the upload directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Original file name as sent by the client
    pub original_name: String,
    /// Public path, e.g. `/uploads/videos/1700000000000000000_intro.mp4`
    pub path: String,
    pub content_type: String,
    pub size: u64,
}

/// A file skipped during a batch upload
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Result of saving a batch of files, each stored file paired with the
/// label it was submitted under
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub stored: Vec<(T, StoredFile)>,
    pub failed: Vec<FailedUpload>,
}

impl<T> BatchOutcome<T> {
    pub fn into_files(self) -> Vec<StoredFile> {
        self.stored.into_iter().map(|(_, file)| file).collect()
    }
}

/// Writes uploads to local disk
pub struct UploadStore {
    config: UploadConfig,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Open a staging file for a part about to be received
    pub async fn stage(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<StagedWriter, UploadError> {
        let dir = self.root().join(STAGING_DIR);
        fs::create_dir_all(&dir).await?;

        let (file, staged) = tempfile::Builder::new()
            .prefix("part-")
            .tempfile_in(&dir)?
            .into_parts();

        Ok(StagedWriter {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            size: 0,
            max: self.max_file_size(),
            handle: fs::File::from_std(file),
            staged,
        })
    }

    /// Validate a staged file and move it into its category
    pub async fn save(
        &self,
        category: UploadCategory,
        file: IncomingFile,
    ) -> Result<StoredFile, UploadError> {
        let IncomingFile {
            file_name,
            content_type,
            size,
            mut staged,
        } = file;

        if size == 0 {
            return Err(UploadError::Empty(file_name));
        }
        if size > self.max_file_size() {
            return Err(UploadError::TooLarge {
                name: file_name,
                size,
                max: self.max_file_size(),
            });
        }
        if !self.config.is_type_allowed(&content_type) {
            return Err(UploadError::TypeNotAllowed(content_type));
        }

        let dir = self.root().join(category.dir_name());
        fs::create_dir_all(&dir).await?;

        let base_name = stored_base_name(&file_name);
        let mut attempt = 0;
        let name = loop {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let name = format!("{}_{}", nanos, base_name);
            match staged.persist_noclobber(dir.join(&name)) {
                Ok(()) => break name,
                Err(e)
                    if e.error.kind() == ErrorKind::AlreadyExists
                        && attempt + 1 < NAME_ATTEMPTS =>
                {
                    staged = e.path;
                    attempt += 1;
                }
                Err(e) => return Err(e.error.into()),
            }
        };

        Ok(StoredFile {
            path: format!("{}/{}/{}", UPLOADS_URL_PREFIX, category.dir_name(), name),
            original_name: file_name,
            content_type,
            size,
        })
    }

    /// Save every file it can.
    ///
    /// A file that fails is logged and skipped. The batch as a whole only
    /// fails when files were given and none of them could be saved.
    pub async fn save_batch<T>(
        &self,
        category: UploadCategory,
        files: impl IntoIterator<Item = (T, IncomingFile)>,
    ) -> Result<BatchOutcome<T>, UploadError> {
        let mut outcome = BatchOutcome {
            stored: Vec::new(),
            failed: Vec::new(),
        };
        let mut total = 0;

        for (label, file) in files {
            total += 1;
            let file_name = file.file_name.clone();
            match self.save(category, file).await {
                Ok(stored) => outcome.stored.push((label, stored)),
                Err(e) => {
                    tracing::warn!(file = %file_name, error = %e, "skipping upload");
                    outcome.failed.push(FailedUpload {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if total > 0 && outcome.stored.is_empty() {
            return Err(UploadError::NothingSaved(total));
        }
        Ok(outcome)
    }

    /// Delete a stored file by its public path. A file already gone is not an error.
    pub async fn remove(&self, public_path: &str) -> Result<(), UploadError> {
        let path = self.resolve(public_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Map a public path back onto the disk, refusing anything that escapes the root
    fn resolve(&self, public_path: &str) -> Result<PathBuf, UploadError> {
        let relative = public_path
            .strip_prefix(UPLOADS_URL_PREFIX)
            .and_then(|p| p.strip_prefix('/'))
            .ok_or_else(|| UploadError::InvalidPath(public_path.to_string()))?;

        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(UploadError::InvalidPath(public_path.to_string()));
        }

        Ok(self.root().join(relative))
    }
}

#[cfg(test)]
impl UploadStore {
    /// Stage an in-memory body as if it had been received
    pub(crate) async fn stage_bytes(&self, name: &str, content_type: &str, data: &[u8]) -> IncomingFile {
        let mut writer = self.stage(name, content_type).await.unwrap();
        writer.write(data).await.unwrap();
        writer.finish().await.unwrap()
    }
}

/// Sanitized original name with whitespace collapsed to underscores
fn stored_base_name(original: &str) -> String {
    let sanitized = sanitize_filename::sanitize(original);
    let joined = sanitized.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() || joined.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        joined
    }
}
