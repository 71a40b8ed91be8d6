use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
};
use serde_json::json;

use super::validator::reject;
use crate::error::ApiError;

/// One file part of a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Text after the last `.`, or the whole name when there is none
    pub fn suffix(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or_default()
    }
}

/// File parts of a multipart request, in arrival order. Plain form fields
/// are skipped.
#[derive(Debug, Clone, Default)]
pub struct UploadedFiles(pub Vec<UploadedFile>);

impl UploadedFiles {
    /// First file sent under `field` with a non-empty name
    pub fn get(&self, field: &str) -> Option<&UploadedFile> {
        self.0.iter().find(|f| f.field == field && !f.file_name.is_empty())
    }

    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut files = Vec::new();
        while let Some(part) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request("unreadable multipart body").with_prompt(e.body_text()))?
        {
            let (Some(field), Some(file_name)) = (part.name().map(str::to_string), part.file_name().map(str::to_string))
            else {
                continue;
            };
            let content_type = part.content_type().map(str::to_string);
            let bytes = part
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request("unreadable multipart body").with_prompt(e.body_text()))?;
            files.push(UploadedFile { field, file_name, content_type, bytes });
        }
        Ok(Self(files))
    }
}

#[async_trait]
impl<S> FromRequest<S> for UploadedFiles
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request("expected a multipart form").with_prompt(e.body_text()))?;
        Self::from_multipart(multipart).await
    }
}

/// Require a file under every name in `fields`.
///
/// `suffixes` is either empty, skipping the suffix check, or holds one list
/// of accepted suffixes per entry of `fields`. A length mismatch is a server
/// error since it is the caller's declaration that is wrong.
pub fn verify_files(files: &UploadedFiles, fields: &[&str], suffixes: &[&[&str]]) -> Result<(), ApiError> {
    if fields.iter().any(|field| files.get(field).is_none()) {
        return Err(reject("incomplete form file parameters", json!(fields)));
    }
    if suffixes.is_empty() {
        return Ok(());
    }
    if suffixes.len() != fields.len() {
        return Err(ApiError::internal_error(
            "file fields and accepted suffixes differ in length",
        ));
    }
    for (field, accepted) in fields.iter().zip(suffixes) {
        let Some(file) = files.get(field) else { continue };
        if !accepted.iter().any(|s| *s == file.suffix()) {
            return Err(reject(
                &format!("file field {} only supports {:?} suffixes", field, accepted),
                json!({"field": field, "file_name": file.file_name, "accepted": accepted}),
            ));
        }
    }
    Ok(())
}
