//! Remote backend: delegate conversion to a Gotenberg-compatible service.
//!
//! The document is POSTed as multipart field `files` to
//! `<base>/forms/libreoffice/convert`; the response body is the PDF.
//! Useful when LibreOffice runs in a sidecar container rather than next to
//! this process.

use super::{Converter, PDF_EXTENSION};
use crate::error::ConvertError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

/// Route of the LibreOffice conversion endpoint relative to the base URL.
const CONVERT_ROUTE: &str = "forms/libreoffice/convert";

/// The remote service picks its import filter from the file extension.
const UPLOAD_FILE_NAME: &str = "document.docx";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Longest slice of an error body kept for logs.
const MAX_ERROR_BODY: usize = 512;

/// Converter that calls a remote HTTP conversion service.
#[derive(Debug, Clone)]
pub struct RemoteConverter {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Option<Duration>,
}

impl RemoteConverter {
    /// Build a converter for the service rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ConvertError> {
        let endpoint = endpoint_for(base_url)?;

        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| ConvertError::Remote {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Converter for RemoteConverter {
    fn name(&self) -> &str {
        "remote"
    }

    async fn convert(&self, input: Vec<u8>, target_extension: &str) -> Result<Vec<u8>, ConvertError> {
        if target_extension != PDF_EXTENSION {
            return Err(ConvertError::Remote {
                reason: format!("remote converter only produces PDF, not '{target_extension}'"),
            });
        }

        let part = Part::bytes(input)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(DOCX_MIME)
            .map_err(|e| ConvertError::Remote {
                reason: e.to_string(),
            })?;
        let form = Form::new().part("files", part);

        debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::RemoteStatus {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(bytes.to_vec())
    }
}

impl RemoteConverter {
    fn map_reqwest(&self, e: reqwest::Error) -> ConvertError {
        match (e.is_timeout(), self.timeout) {
            (true, Some(limit)) => ConvertError::Timeout { limit },
            _ => ConvertError::Remote {
                reason: e.to_string(),
            },
        }
    }
}

/// Join the conversion route onto `base_url`, tolerating a trailing slash or not.
fn endpoint_for(base_url: &str) -> Result<Url, ConvertError> {
    let mut base = Url::parse(base_url).map_err(|e| ConvertError::Remote {
        reason: format!("invalid URL '{base_url}': {e}"),
    })?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(CONVERT_ROUTE).map_err(|e| ConvertError::Remote {
        reason: e.to_string(),
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\u{2026}", &s[..end])
}
