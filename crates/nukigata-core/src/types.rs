//! Domain types shared by the token, lookup and store clients.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NukigataError, NukigataResult};

/// Scope for read-only access to the drawing folders.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Scope for reading and updating the die sheet.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Extension priority used when ranking candidates: images first, PDF last.
pub const EXTENSION_PRIORITY: [&str; 4] = ["jpeg", "jpg", "png", "pdf"];

fn default_scopes() -> Vec<String> {
    vec![DRIVE_READONLY_SCOPE.to_string(), SPREADSHEETS_SCOPE.to_string()]
}

/// Service principal used to mint access tokens.
///
/// Deserializes from a service-account key file (`client_email`, `private_key`,
/// optional `token_uri`). Scopes are not part of the key file and default to
/// drive read-only plus spreadsheets.
#[derive(Clone, Deserialize)]
pub struct ServiceIdentity {
    #[serde(rename = "client_email")]
    pub issuer_email: String,

    #[serde(rename = "private_key")]
    pub private_key_pem: String,

    /// Token endpoint advertised by the key file.
    #[serde(default)]
    pub token_uri: Option<String>,

    #[serde(skip_deserializing, default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("issuer_email", &self.issuer_email)
            .field("private_key_pem", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ServiceIdentity {
    pub fn new(issuer_email: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        Self {
            issuer_email: issuer_email.into(),
            private_key_pem: private_key_pem.into(),
            token_uri: None,
            scopes: default_scopes(),
        }
    }

    /// Parse a service-account key file.
    pub fn from_json(json: &str) -> NukigataResult<Self> {
        let mut identity: Self =
            serde_json::from_str(json).map_err(|e| NukigataError::Credential {
                message: format!("failed to parse service account json: {}", e),
            })?;

        // Keys pasted into env vars sometimes keep their escaped newlines.
        if !identity.private_key_pem.contains('\n') && identity.private_key_pem.contains("\\n") {
            identity.private_key_pem = identity.private_key_pem.replace("\\n", "\n");
        }

        if identity.issuer_email.trim().is_empty() {
            return Err(NukigataError::Credential {
                message: "service account json has an empty client_email".into(),
            });
        }
        if identity.private_key_pem.trim().is_empty() {
            return Err(NukigataError::Credential {
                message: "service account json has an empty private_key".into(),
            });
        }

        Ok(identity)
    }

    /// Read a service-account key file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> NukigataResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| NukigataError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&raw)
    }

    /// Load from the environment.
    ///
    /// `GOOGLE_SA_JSON` (the key file contents) wins over `GOOGLE_SA_FILE` (a path).
    pub fn from_env() -> NukigataResult<Self> {
        if let Ok(json) = std::env::var("GOOGLE_SA_JSON") {
            if !json.trim().is_empty() {
                return Self::from_json(&json);
            }
        }

        if let Ok(path) = std::env::var("GOOGLE_SA_FILE") {
            if !path.trim().is_empty() {
                return Self::from_file(path.trim());
            }
        }

        Err(NukigataError::config(
            "missing GOOGLE_SA_JSON / GOOGLE_SA_FILE",
        ))
    }

    /// Like [`Self::from_env`], but `Ok(None)` when neither variable is set.
    /// A variable that is set but unusable is still an error.
    pub fn from_env_if_present() -> NukigataResult<Option<Self>> {
        let present = ["GOOGLE_SA_JSON", "GOOGLE_SA_FILE"]
            .iter()
            .any(|name| std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false));

        if present {
            Self::from_env().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Replace the scopes, keeping first occurrence order and dropping duplicates.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            if !scope.is_empty() && !ordered.contains(&scope) {
                ordered.push(scope);
            }
        }
        self.scopes = ordered;
        self
    }

    /// Space-separated scope claim.
    pub fn scope_claim(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Normalize a workcode for name comparison.
///
/// Values that parse as an integer (including integral floats such as
/// `"6521.0"` coming out of spreadsheet cells) become their canonical decimal
/// string. Anything else is returned trimmed.
pub fn normalize_workcode(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Ok(n) = trimmed.parse::<i64>() {
        return n.to_string();
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        // 2^53: beyond this an f64 no longer names a single integer.
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
            return (f as i64).to_string();
        }
    }

    trimmed.to_string()
}

/// Caller-supplied (book, workcode) key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LookupKey {
    book: String,
    workcode: String,
}

impl LookupKey {
    /// Build a key; both parts must be non-empty after trimming.
    pub fn new(book: impl AsRef<str>, workcode: impl AsRef<str>) -> NukigataResult<Self> {
        let book = book.as_ref().trim();
        let workcode = workcode.as_ref().trim();

        if book.is_empty() {
            return Err(NukigataError::InvalidKey {
                reason: "book is empty".into(),
            });
        }
        if workcode.is_empty() {
            return Err(NukigataError::InvalidKey {
                reason: "workcode is empty".into(),
            });
        }

        Ok(Self {
            book: book.to_string(),
            workcode: normalize_workcode(workcode),
        })
    }

    pub fn book(&self) -> &str {
        &self.book
    }

    /// Normalized workcode.
    pub fn workcode(&self) -> &str {
        &self.workcode
    }

    /// File stem used by the legacy flat naming (`{book}-{workcode}`).
    pub fn legacy_stem(&self) -> String {
        format!("{}-{}", self.book, self.workcode)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.book, self.workcode)
    }
}

/// A file (or folder) returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateArtifact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl CandidateArtifact {
    /// Position of this file's extension in [`EXTENSION_PRIORITY`]; unknown
    /// extensions sort after every known one.
    pub fn extension_rank(&self) -> usize {
        self.name
            .rsplit_once('.')
            .and_then(|(_, ext)| EXTENSION_PRIORITY.iter().position(|p| *p == ext))
            .unwrap_or(EXTENSION_PRIORITY.len())
    }
}

/// Which naming rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// `{root}/{book}/…/{workcode}.{ext}`.
    BookFolder,
    /// `{root}/…/{book}-{workcode}.{ext}`.
    LegacyName,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BookFolder => write!(f, "book_folder"),
            Self::LegacyName => write!(f, "legacy_name"),
        }
    }
}

/// Outcome of a lookup. `found == false` is a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocateResult {
    pub found: bool,

    /// Candidates in rank order.
    pub candidates: Vec<CandidateArtifact>,

    /// Rule that matched, if any.
    pub rule: Option<MatchRule>,

    /// Folders listed across both rules.
    pub folders_visited: usize,
}

impl LocateResult {
    pub fn not_found(folders_visited: usize) -> Self {
        Self {
            found: false,
            candidates: Vec::new(),
            rule: None,
            folders_visited,
        }
    }

    /// Highest-ranked candidate.
    pub fn best(&self) -> Option<&CandidateArtifact> {
        self.candidates.first()
    }
}

/// Bearer token issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable `margin` past `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at > now + margin
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.value.chars().take(6).collect();
        f.debug_struct("AccessToken")
            .field("value", &format_args!("{}…", prefix))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A die seen at a location by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub key: LookupKey,
    pub location: String,
    pub seen_at: DateTime<Utc>,
    /// Die name to write alongside the location, when the scan carried one.
    pub work_name: Option<String>,
}

impl Sighting {
    pub fn new(key: LookupKey, location: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            key,
            location: location.into().trim().to_string(),
            seen_at,
            work_name: None,
        }
    }

    /// Attach a die name; blank names are ignored.
    pub fn with_work_name(mut self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim();
        self.work_name = (!name.is_empty()).then(|| name.to_string());
        self
    }

    /// `seen_at` as written to the stores.
    pub fn seen_at_text(&self) -> String {
        self.seen_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}
