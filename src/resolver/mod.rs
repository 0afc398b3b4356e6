use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use url::Url;

use crate::content::{mime_essence, ContentUnit, MAX_FILE_SIZE};
use crate::utils::{extract_domain, now_millis};
use crate::{ProcessingError, Result};

/// Name given to downloads whose URL has no usable last path segment
pub const FALLBACK_FILE_NAME: &str = "downloaded-file";

/// Turns a URL into a content unit the pipeline can process
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ContentUnit>;
}

/// Validate a URL, accepting only HTTP and HTTPS
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|_| ProcessingError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProcessingError::InvalidUrl(format!(
            "{} (URL must use HTTP or HTTPS protocol)",
            url
        )));
    }

    Ok(parsed)
}

/// Whether user input should be treated as a URL rather than a local path
pub fn looks_like_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// File name taken from the last non-empty path segment, URL-decoded
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|name| name.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Result of a metadata-only request
#[derive(Debug, Clone)]
struct ProbeInfo {
    final_url: Url,
    content_type: Option<String>,
    content_length: Option<u64>,
}

/// Resolves URLs over HTTP: probe with HEAD, then download the final URL
pub struct HttpResolver {
    client: Client,
    max_size: u64,
}

impl HttpResolver {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_size: MAX_FILE_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Get content information via HEAD request, following redirects
    async fn probe(&self, url: &Url) -> Result<ProbeInfo> {
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| ProcessingError::FetchFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProcessingError::FetchFailed(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        Ok(ProbeInfo {
            final_url: response.url().clone(),
            content_type,
            content_length,
        })
    }

    /// Download the body, enforcing the size limit while streaming
    async fn fetch(&self, url: &Url) -> Result<(Url, Option<String>, Vec<u8>)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProcessingError::FetchFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProcessingError::FetchFailed(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let mut body = Vec::with_capacity(response.content_length().unwrap_or(0).min(self.max_size) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProcessingError::FetchFailed(format!("{}: {}", final_url, e)))?;
            body.extend_from_slice(&chunk);

            if body.len() as u64 > self.max_size {
                return Err(ProcessingError::ContentTooLarge {
                    size: body.len() as u64,
                    limit: self.max_size,
                });
            }
        }

        Ok((final_url, content_type, body))
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentResolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Result<ContentUnit> {
        let parsed = validate_url(url)?;

        tracing::info!(
            domain = extract_domain(url).as_deref().unwrap_or("unknown"),
            "Probing URL: {}",
            parsed
        );
        let probe = self.probe(&parsed).await?;

        let Some(probed_type) = probe.content_type else {
            return Err(ProcessingError::FetchFailed(format!(
                "{}: no content type reported",
                probe.final_url
            )));
        };

        if let Some(size) = probe.content_length {
            if size > self.max_size {
                return Err(ProcessingError::ContentTooLarge {
                    size,
                    limit: self.max_size,
                });
            }
        }

        if probe.final_url != parsed {
            tracing::debug!("Redirected to {}", probe.final_url);
        }

        let (final_url, content_type, data) = self.fetch(&probe.final_url).await?;
        let mime_type = mime_essence(content_type.as_deref().unwrap_or(&probed_type));
        let name = file_name_from_url(&final_url);

        tracing::info!("Downloaded {} ({} bytes, {})", name, data.len(), mime_type);

        Ok(ContentUnit::new(name, mime_type, data, now_millis()))
    }
}
