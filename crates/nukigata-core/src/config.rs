//! Runtime configuration.
//!
//! Built from the environment ([`NukigataConfig::from_env`]) or a YAML file
//! ([`NukigataConfig::from_yaml_file`]). Service-account key material is not
//! part of this struct; see [`crate::ServiceIdentity::from_env`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::DEFAULT_TOKEN_URL;
use crate::drive::DEFAULT_DRIVE_URL;
use crate::error::{NukigataError, NukigataResult};
use crate::locator::LocatorConfig;
use crate::transport::RetryPolicy;

pub const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com/v4";

pub const DEFAULT_ORDER_API_URL: &str = "https://api.airtable.com/v0";

fn default_worksheet() -> String {
    "wsTableCD".to_string()
}

fn default_order_table() -> String {
    "TableJuchu".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_drive_url() -> String {
    DEFAULT_DRIVE_URL.to_string()
}

fn default_sheets_url() -> String {
    DEFAULT_SHEETS_URL.to_string()
}

fn default_order_api_url() -> String {
    DEFAULT_ORDER_API_URL.to_string()
}

fn default_book_field() -> String {
    "Book".to_string()
}

fn default_workcode_field() -> String {
    "WorkCord".to_string()
}

fn default_location_field() -> String {
    "Location".to_string()
}

fn default_last_seen_field() -> String {
    "LastSeen".to_string()
}

/// Column names in the order table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFields {
    #[serde(default = "default_book_field")]
    pub book: String,

    #[serde(default = "default_workcode_field")]
    pub workcode: String,

    #[serde(default = "default_location_field")]
    pub location: String,

    #[serde(default = "default_last_seen_field")]
    pub last_seen: String,
}

impl Default for OrderFields {
    fn default() -> Self {
        Self {
            book: default_book_field(),
            workcode: default_workcode_field(),
            location: default_location_field(),
            last_seen: default_last_seen_field(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NukigataConfig {
    /// Master folder holding the die drawings.
    #[serde(default)]
    pub root_folder_id: Option<String>,

    /// Spreadsheet holding die metadata.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    #[serde(default = "default_worksheet")]
    pub worksheet: String,

    #[serde(default)]
    pub order_base_id: Option<String>,

    #[serde(default = "default_order_table")]
    pub order_table: String,

    /// Personal access token for the order table.
    #[serde(default, skip_serializing)]
    pub order_token: Option<String>,

    #[serde(default)]
    pub order_fields: OrderFields,

    /// Whether the order table stores workcodes as numbers.
    #[serde(default = "default_true")]
    pub workcode_is_number: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Token endpoint override. Falls back to the key file's `token_uri`.
    #[serde(default)]
    pub token_url: Option<String>,

    #[serde(default = "default_drive_url")]
    pub drive_url: String,

    #[serde(default = "default_sheets_url")]
    pub sheets_url: String,

    #[serde(default = "default_order_api_url")]
    pub order_api_url: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub locator: LocatorConfig,
}

impl Default for NukigataConfig {
    fn default() -> Self {
        Self {
            root_folder_id: None,
            spreadsheet_id: None,
            worksheet: default_worksheet(),
            order_base_id: None,
            order_table: default_order_table(),
            order_token: None,
            order_fields: OrderFields::default(),
            workcode_is_number: default_true(),
            timeout_secs: default_timeout(),
            token_url: None,
            drive_url: default_drive_url(),
            sheets_url: default_sheets_url(),
            order_api_url: default_order_api_url(),
            retry: RetryPolicy::default(),
            locator: LocatorConfig::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

impl NukigataConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `GDRIVE_DIE_MASTER_ID` | Master folder id |
    /// | `GS_SPREADSHEET_ID` | Die sheet id |
    /// | `GS_WORKSHEET_NAME` | Worksheet name (default `wsTableCD`) |
    /// | `AIRTABLE_BASE_ID` | Order base id (`AIRTABLE_BASE` also accepted) |
    /// | `AIRTABLE_TABLE` | Order table (default `TableJuchu`) |
    /// | `AIRTABLE_PAT` | Order table token (`AIRTABLE_TOKEN` also accepted) |
    /// | `FIELD_BOOK`, `FIELD_WC`, `FIELD_LOCATION`, `FIELD_LASTSEEN` | Order table column names |
    /// | `NUKIGATA_TIMEOUT` | Request timeout in seconds |
    /// | `NUKIGATA_MAX_ATTEMPTS` | Retry attempt budget |
    /// | `NUKIGATA_MAX_FOLDERS` | Folder budget per search |
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            root_folder_id: env_var("GDRIVE_DIE_MASTER_ID"),
            spreadsheet_id: env_var("GS_SPREADSHEET_ID"),
            worksheet: env_var("GS_WORKSHEET_NAME").unwrap_or(defaults.worksheet),
            order_base_id: env_var("AIRTABLE_BASE_ID").or_else(|| env_var("AIRTABLE_BASE")),
            order_table: env_var("AIRTABLE_TABLE").unwrap_or(defaults.order_table),
            order_token: env_var("AIRTABLE_PAT").or_else(|| env_var("AIRTABLE_TOKEN")),
            order_fields: OrderFields {
                book: env_var("FIELD_BOOK").unwrap_or(defaults.order_fields.book),
                workcode: env_var("FIELD_WC").unwrap_or(defaults.order_fields.workcode),
                location: env_var("FIELD_LOCATION").unwrap_or(defaults.order_fields.location),
                last_seen: env_var("FIELD_LASTSEEN").unwrap_or(defaults.order_fields.last_seen),
            },
            timeout_secs: env_parse("NUKIGATA_TIMEOUT").unwrap_or(defaults.timeout_secs),
            retry: RetryPolicy {
                max_attempts: env_parse("NUKIGATA_MAX_ATTEMPTS")
                    .unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            locator: LocatorConfig {
                max_folders: env_parse("NUKIGATA_MAX_FOLDERS")
                    .unwrap_or(defaults.locator.max_folders),
            },
            ..defaults
        }
    }

    pub fn from_yaml_str(yaml: &str) -> NukigataResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| NukigataError::Config {
            message: format!("invalid config: {}", e),
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> NukigataResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| NukigataError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn with_root_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.root_folder_id = Some(folder_id.into());
        self
    }

    pub fn with_spreadsheet(mut self, spreadsheet_id: impl Into<String>) -> Self {
        self.spreadsheet_id = Some(spreadsheet_id.into());
        self
    }

    pub fn with_worksheet(mut self, worksheet: impl Into<String>) -> Self {
        self.worksheet = worksheet.into();
        self
    }

    pub fn with_order_table(
        mut self,
        base_id: impl Into<String>,
        table: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.order_base_id = Some(base_id.into());
        self.order_table = table.into();
        self.order_token = Some(token.into());
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    /// Point every Google endpoint and the order API at one host (tests, proxies).
    pub fn with_api_base(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.drive_url = base.to_string();
        self.sheets_url = base.to_string();
        self.order_api_url = base.to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_folders(mut self, max_folders: usize) -> Self {
        self.locator.max_folders = max_folders;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn require_root_folder(&self) -> NukigataResult<&str> {
        required(self.root_folder_id.as_deref(), "GDRIVE_DIE_MASTER_ID")
    }

    pub fn require_spreadsheet(&self) -> NukigataResult<&str> {
        required(self.spreadsheet_id.as_deref(), "GS_SPREADSHEET_ID")
    }

    pub fn require_order_base(&self) -> NukigataResult<&str> {
        required(self.order_base_id.as_deref(), "AIRTABLE_BASE_ID")
    }

    pub fn require_order_token(&self) -> NukigataResult<&str> {
        required(self.order_token.as_deref(), "AIRTABLE_PAT")
    }

    /// Token endpoint for a key file that advertises `token_uri`.
    pub fn effective_token_url(&self, token_uri: Option<&str>) -> String {
        self.token_url
            .as_deref()
            .or(token_uri)
            .unwrap_or(DEFAULT_TOKEN_URL)
            .to_string()
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> NukigataResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(NukigataError::config(format!("{} is not configured", name))),
    }
}
