//! Facade wiring the clients together from one [`NukigataConfig`].

use std::time::Duration;

use tracing::debug;

use crate::auth::{TokenIssuer, TokenProvider};
use crate::config::NukigataConfig;
use crate::drive::{DriveClient, MediaContent};
use crate::error::{NukigataError, NukigataResult};
use crate::locator::ResourceLocator;
use crate::orders::OrderTable;
use crate::sheets::SheetsClient;
use crate::transport::RetryingTransport;
use crate::types::{AccessToken, LocateResult, LookupKey, ServiceIdentity};

/// Die lookup service.
///
/// One [`TokenIssuer`] is shared by the locator, media fetch and sheet
/// client, so they reuse a single cached token. Clients whose configuration
/// is missing fail with [`NukigataError::Config`] when first used.
#[derive(Debug, Clone)]
pub struct DieService {
    config: NukigataConfig,
    transport: RetryingTransport,
    issuer: Option<TokenIssuer>,
}

impl DieService {
    pub fn new(config: NukigataConfig, identity: Option<ServiceIdentity>) -> NukigataResult<Self> {
        let transport =
            RetryingTransport::with_timeout(Duration::from_secs(config.timeout_secs), config.retry)?;

        let issuer = match identity {
            Some(identity) => {
                let token_url = config.effective_token_url(identity.token_uri.as_deref());
                Some(
                    TokenIssuer::new(&identity, transport.client().clone())?
                        .with_token_url(token_url),
                )
            }
            None => None,
        };

        Ok(Self {
            config,
            transport,
            issuer,
        })
    }

    /// Build from environment variables.
    ///
    /// The service identity is optional here: without `GOOGLE_SA_JSON` or
    /// `GOOGLE_SA_FILE` only the order table is usable. A key that is present
    /// but broken is still an error.
    pub fn from_env() -> NukigataResult<Self> {
        let identity = ServiceIdentity::from_env_if_present()?;
        if identity.is_none() {
            debug!("no service account configured");
        }
        Self::new(NukigataConfig::from_env(), identity)
    }

    pub fn config(&self) -> &NukigataConfig {
        &self.config
    }

    fn issuer(&self) -> NukigataResult<&TokenIssuer> {
        self.issuer.as_ref().ok_or_else(|| {
            NukigataError::config("no service account configured (GOOGLE_SA_JSON / GOOGLE_SA_FILE)")
        })
    }

    fn google_tokens(&self) -> NukigataResult<TokenProvider> {
        Ok(TokenProvider::ServiceAccount(self.issuer()?.clone()))
    }

    /// Current access token for the service account.
    pub async fn token(&self) -> NukigataResult<AccessToken> {
        self.issuer()?.get_token().await
    }

    pub fn drive(&self) -> NukigataResult<DriveClient> {
        Ok(
            DriveClient::new(self.transport.clone(), self.google_tokens()?)
                .with_base_url(&self.config.drive_url),
        )
    }

    pub fn locator(&self) -> NukigataResult<ResourceLocator> {
        Ok(ResourceLocator::new(self.drive()?, self.config.locator))
    }

    /// Locate under the configured master folder.
    pub async fn locate(&self, key: &LookupKey) -> NukigataResult<LocateResult> {
        let root = self.config.require_root_folder()?;
        self.locate_in(key, root).await
    }

    /// Locate under an explicit root folder.
    pub async fn locate_in(&self, key: &LookupKey, root_folder_id: &str) -> NukigataResult<LocateResult> {
        self.locator()?.locate(key, root_folder_id).await
    }

    pub async fn fetch_media(&self, file_id: &str) -> NukigataResult<MediaContent> {
        self.drive()?.fetch_media(file_id).await
    }

    pub fn sheets(&self) -> NukigataResult<SheetsClient> {
        let spreadsheet_id = self.config.require_spreadsheet()?;
        Ok(SheetsClient::new(
            self.transport.clone(),
            self.google_tokens()?,
            spreadsheet_id,
            &self.config.worksheet,
        )
        .with_base_url(&self.config.sheets_url))
    }

    pub fn orders(&self) -> NukigataResult<OrderTable> {
        let base_id = self.config.require_order_base()?;
        let token = self.config.require_order_token()?;
        Ok(OrderTable::new(
            self.transport.clone(),
            TokenProvider::static_token(token),
            base_id,
            &self.config.order_table,
        )
        .with_base_url(&self.config.order_api_url)
        .with_fields(self.config.order_fields.clone())
        .with_workcode_is_number(self.config.workcode_is_number))
    }
}
