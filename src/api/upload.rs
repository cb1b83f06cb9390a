//! Multipart form reading
//!
//! Handlers that accept uploads read the whole form first: text parts are
//! kept as strings (repeated names allowed), file parts are streamed chunk by
//! chunk into the upload store's staging area as [`IncomingFile`]s and moved
//! into place afterwards. Files written for a request that then fails are
//! discarded again.

use axum::extract::{FromRequest, Multipart, Request};
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState};
use crate::services::{IncomingFile, StoredFile, UploadStore};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A fully read multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, IncomingFile)>,
}

impl FromRequest<AppState> for MultipartForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state).await?;
        MultipartForm::read(multipart, &state.uploads).await
    }
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart, uploads: &UploadStore) -> Result<Self, ApiError> {
        let mut form = MultipartForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or(DEFAULT_CONTENT_TYPE)
                        .to_string();

                    let mut writer = uploads.stage(&file_name, &content_type).await?;
                    while let Some(chunk) = field.chunk().await? {
                        writer.write(&chunk).await?;
                    }
                    let file = writer.finish().await?;

                    // An untouched file input arrives as an empty unnamed part
                    if file_name.is_empty() && file.size == 0 {
                        continue;
                    }
                    form.files.push((name, file));
                }
                None => {
                    let value = field.text().await?;
                    form.fields.push((name, value));
                }
            }
        }

        Ok(form)
    }

    /// First non-blank value of a text field, trimmed
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
    }

    /// Every value of a repeated text field, in order
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.trim().to_string())
            .collect()
    }

    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::validation_error(format!("Field '{}' is required", name)))
    }

    /// Parse an optional field, rejecting values that do not parse
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ApiError::validation_error(format!("Field '{}' has an invalid value", name))
                })
            })
            .transpose()
    }

    pub fn parse_required<T: FromStr>(&self, name: &str) -> Result<T, ApiError> {
        self.parse(name)?
            .ok_or_else(|| ApiError::validation_error(format!("Field '{}' is required", name)))
    }

    /// Remove and return every file sent under the field name
    pub fn take_files(&mut self, name: &str) -> Vec<IncomingFile> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(n, _)| n == name);
        self.files = rest;
        taken.into_iter().map(|(_, file)| file).collect()
    }

    /// Remove and return the first file sent under the field name
    pub fn take_file(&mut self, name: &str) -> Option<IncomingFile> {
        let index = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.remove(index).1)
    }
}

/// Remove files written for a request that then failed
pub async fn discard(uploads: &UploadStore, files: &[StoredFile]) {
    for file in files {
        if let Err(e) = uploads.remove(&file.path).await {
            tracing::warn!(path = %file.path, error = %e, "failed to discard upload");
        }
    }
}
