//! Die (抜型) lookup core.
//!
//! Resolves a scanned (book, workcode) key to the die's drawing file and
//! keeps the location stores in step:
//!
//! - Service-account token issuance (signed RS256 assertion, JWT bearer grant)
//! - Retrying HTTP transport with jittered exponential backoff
//! - Two-rule breadth-first search of the drawing folders
//! - Die sheet lookup and location updates
//! - Order table lookup and location updates
//!
//! # Quick Start
//!
//! ```no_run
//! use nukigata_core::{DieService, LookupKey};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = DieService::from_env()?;
//!
//! let key = LookupKey::new("Ta", "9892")?;
//! let result = service.locate(&key).await?;
//! if let Some(best) = result.best() {
//!     println!("drawing: {} ({})", best.name, best.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `GOOGLE_SA_JSON` | Service-account key file contents |
//! | `GOOGLE_SA_FILE` | Path to the service-account key file |
//! | `GDRIVE_DIE_MASTER_ID` | Master folder holding the drawings |
//! | `GS_SPREADSHEET_ID` | Die sheet |
//! | `GS_WORKSHEET_NAME` | Worksheet (default: `wsTableCD`) |
//! | `AIRTABLE_BASE_ID` | Order base |
//! | `AIRTABLE_TABLE` | Order table (default: `TableJuchu`) |
//! | `AIRTABLE_PAT` | Order table access token |
//! | `NUKIGATA_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `NUKIGATA_MAX_ATTEMPTS` | Attempts per request, including the first (default: 6) |
//! | `NUKIGATA_MAX_FOLDERS` | Folders listed per search (default: 300) |

pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod locator;
pub mod orders;
pub mod service;
pub mod sheets;
pub mod signer;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use auth::{TokenIssuer, TokenProvider, DEFAULT_TOKEN_URL};
pub use config::{NukigataConfig, OrderFields};
pub use drive::{DriveClient, DriveQuery, MediaContent};
pub use error::{NukigataError, NukigataResult};
pub use locator::{LocatorConfig, ResourceLocator};
pub use orders::{OrderRecord, OrderTable, OrderUpdateSummary};
pub use service::DieService;
pub use sheets::{DieRow, SheetsClient, SightingSummary};
pub use signer::{AssertionClaims, SignedAssertion, Signer};
pub use transport::{RetryPolicy, RetryingTransport};
pub use types::{
    normalize_workcode, AccessToken, CandidateArtifact, LocateResult, LookupKey, MatchRule,
    ServiceIdentity, Sighting,
};
