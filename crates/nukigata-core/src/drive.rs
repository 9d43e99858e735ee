//! Drawing-file store client: listing queries and media download.
//!
//! Every call goes through [`RetryingTransport`] with a bearer token from the
//! shared [`TokenProvider`]. Failures of a listing call are reported as
//! [`NukigataError::Lookup`] carrying the query that failed; token failures
//! keep their own classification.

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::{truncate_body, NukigataError, NukigataResult};
use crate::transport::{endpoint, RetryingTransport};
use crate::types::CandidateArtifact;

pub const DEFAULT_DRIVE_URL: &str = "https://www.googleapis.com/drive/v3";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";
const PAGE_SIZE: &str = "1000";

/// Escape a value for use inside a single-quoted query literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Conjunction of listing predicates, rendered as the `q` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveQuery {
    clauses: Vec<String>,
}

impl DriveQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items whose parents include `folder_id`.
    pub fn in_parent(mut self, folder_id: &str) -> Self {
        self.clauses
            .push(format!("'{}' in parents", escape_literal(folder_id)));
        self
    }

    pub fn folders_only(mut self) -> Self {
        self.clauses
            .push(format!("mimeType='{}'", FOLDER_MIME_TYPE));
        self
    }

    pub fn not_trashed(mut self) -> Self {
        self.clauses.push("trashed=false".to_string());
        self
    }

    pub fn name_equals(mut self, name: &str) -> Self {
        self.clauses.push(format!("name='{}'", escape_literal(name)));
        self
    }

    /// Items whose name equals any of `names`. An empty list matches nothing
    /// and is left out of the query.
    pub fn name_in<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = names
            .into_iter()
            .map(|n| format!("name='{}'", escape_literal(n.as_ref())))
            .collect();

        if !alternatives.is_empty() {
            self.clauses
                .push(format!("({})", alternatives.join(" or ")));
        }
        self
    }
}

impl fmt::Display for DriveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clauses.join(" and "))
    }
}

/// Downloaded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContent {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<CandidateArtifact>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Client for the file listing and media endpoints.
#[derive(Debug, Clone)]
pub struct DriveClient {
    transport: RetryingTransport,
    tokens: TokenProvider,
    base_url: String,
}

impl DriveClient {
    pub fn new(transport: RetryingTransport, tokens: TokenProvider) -> Self {
        Self {
            transport,
            tokens,
            base_url: DEFAULT_DRIVE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run `query`, following `nextPageToken` until the listing is exhausted.
    pub async fn list(&self, query: &DriveQuery) -> NukigataResult<Vec<CandidateArtifact>> {
        let q = query.to_string();
        let token = self.tokens.bearer().await?;
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = endpoint(&self.base_url, &["files"])?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("q", &q)
                    .append_pair("fields", LIST_FIELDS)
                    .append_pair("pageSize", PAGE_SIZE);
                if let Some(page) = page_token.as_deref() {
                    pairs.append_pair("pageToken", page);
                }
            }

            debug!(q = %q, page = ?page_token, "listing files");

            let request = self
                .transport
                .client()
                .get(url)
                .bearer_auth(&token)
                .build()
                .map_err(|e| lookup_error(&q, format!("failed to build request: {}", e)))?;

            let response = self
                .transport
                .send(request)
                .await
                .map_err(|e| lookup_error(&q, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(lookup_error(
                    &q,
                    format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
                ));
            }

            let page: FileList = response
                .json()
                .await
                .map_err(|e| lookup_error(&q, format!("failed to parse listing: {}", e)))?;

            files.extend(page.files);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next)
                }
                _ => break,
            }
        }

        Ok(files)
    }

    /// Download a file's content.
    pub async fn fetch_media(&self, file_id: &str) -> NukigataResult<MediaContent> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(NukigataError::InvalidKey {
                reason: "file id is empty".into(),
            });
        }

        let query = format!("media {}", file_id);
        let mut url = endpoint(&self.base_url, &["files", file_id])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self.tokens.bearer().await?;
        debug!(file_id, "fetching media");

        let request = self
            .transport
            .client()
            .get(url)
            .bearer_auth(&token)
            .build()
            .map_err(|e| lookup_error(&query, format!("failed to build request: {}", e)))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| lookup_error(&query, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_error(
                &query,
                format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| lookup_error(&query, format!("failed to read body: {}", e)))?;

        Ok(MediaContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

fn lookup_error(query: &str, message: impl Into<String>) -> NukigataError {
    NukigataError::Lookup {
        query: query.to_string(),
        message: message.into(),
    }
}
