//! Order table client: find order records for a die and stamp where it was
//! last seen.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::config::{OrderFields, DEFAULT_ORDER_API_URL};
use crate::drive::escape_literal;
use crate::error::{NukigataError, NukigataResult};
use crate::transport::{check_status, endpoint, RetryingTransport};
use crate::types::{LookupKey, Sighting};

const SERVICE: &str = "orders";

const PAGE_SIZE: &str = "100";

/// Records per PATCH request; the API rejects larger batches.
pub const PATCH_CHUNK_SIZE: usize = 10;

/// A record as returned by the table API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,

    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(default, rename = "createdTime", skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl OrderRecord {
    /// Field value rendered as text, if present.
    pub fn field_text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Outcome of a bulk location update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderUpdateSummary {
    pub updated_records: usize,

    /// One line per sighting that updated nothing, with the reason.
    pub skipped: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<OrderRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderTable {
    transport: RetryingTransport,
    token: TokenProvider,
    base_url: String,
    base_id: String,
    table: String,
    fields: OrderFields,
    workcode_is_number: bool,
}

impl OrderTable {
    pub fn new(
        transport: RetryingTransport,
        token: TokenProvider,
        base_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token,
            base_url: DEFAULT_ORDER_API_URL.to_string(),
            base_id: base_id.into(),
            table: table.into(),
            fields: OrderFields::default(),
            workcode_is_number: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fields(mut self, fields: OrderFields) -> Self {
        self.fields = fields;
        self
    }

    /// Whether the workcode column holds numbers (compared unquoted).
    pub fn with_workcode_is_number(mut self, is_number: bool) -> Self {
        self.workcode_is_number = is_number;
        self
    }

    /// Filter formula selecting the records for `key`.
    pub fn formula(&self, key: &LookupKey) -> String {
        let workcode = key.workcode();
        let numeric = workcode
            .parse::<f64>()
            .map(f64::is_finite)
            .unwrap_or(false);

        let wc_expr = if self.workcode_is_number && numeric {
            workcode.to_string()
        } else {
            format!("'{}'", escape_literal(workcode))
        };

        format!(
            "AND({{{}}}='{}',{{{}}}={})",
            self.fields.book,
            escape_literal(key.book()),
            self.fields.workcode,
            wc_expr
        )
    }

    /// Records matching `key`, following pages until `limit` is reached.
    pub async fn list_records(
        &self,
        key: &LookupKey,
        limit: usize,
    ) -> NukigataResult<Vec<OrderRecord>> {
        let formula = self.formula(key);
        let token = self.token.bearer().await?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        while records.len() < limit {
            let mut url = self.table_url()?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("filterByFormula", &formula)
                    .append_pair("pageSize", PAGE_SIZE);
                if let Some(offset) = offset.as_deref() {
                    pairs.append_pair("offset", offset);
                }
            }

            debug!(formula = %formula, offset = ?offset, "listing order records");
            let request = self
                .transport
                .client()
                .get(url)
                .bearer_auth(&token)
                .build()?;

            let response = check_status(SERVICE, self.transport.send(request).await?).await?;
            let page: RecordPage =
                response
                    .json()
                    .await
                    .map_err(|e| NukigataError::InvalidResponse {
                        message: format!("failed to parse order records: {}", e),
                    })?;

            records.extend(page.records);

            match page.offset.filter(|o| !o.is_empty()) {
                Some(next) if offset.as_deref() != Some(next.as_str()) => offset = Some(next),
                Some(next) => {
                    warn!(offset = %next, "order listing repeated its offset, stopping");
                    break;
                }
                None => break,
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    pub async fn find_record_ids(&self, key: &LookupKey) -> NukigataResult<Vec<String>> {
        Ok(self
            .list_records(key, usize::MAX)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    /// Set location (and last-seen, when given) on every record in `ids`.
    /// Returns the number of records the API reports as updated.
    pub async fn update_location(
        &self,
        ids: &[String],
        location: &str,
        last_seen: Option<&str>,
    ) -> NukigataResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut fields = Map::new();
        fields.insert(self.fields.location.clone(), json!(location));
        if let Some(last_seen) = last_seen.filter(|s| !s.is_empty()) {
            fields.insert(self.fields.last_seen.clone(), json!(last_seen));
        }

        let token = self.token.bearer().await?;
        let mut updated = 0;

        for chunk in ids.chunks(PATCH_CHUNK_SIZE) {
            let records: Vec<Value> = chunk
                .iter()
                .map(|id| json!({ "id": id, "fields": fields }))
                .collect();

            let request = self
                .transport
                .client()
                .patch(self.table_url()?)
                .bearer_auth(&token)
                .json(&json!({ "records": records }))
                .build()?;

            let response = check_status(SERVICE, self.transport.send(request).await?).await?;
            let page: RecordPage =
                response
                    .json()
                    .await
                    .map_err(|e| NukigataError::InvalidResponse {
                        message: format!("failed to parse update response: {}", e),
                    })?;

            updated += page.records.len();
        }

        Ok(updated)
    }

    /// Apply each distinct sighting to its order records.
    ///
    /// A sighting whose lookup or update fails, or that matches no record, is
    /// reported in `skipped` and does not stop the rest of the batch.
    pub async fn apply_sightings(
        &self,
        sightings: &[Sighting],
    ) -> NukigataResult<OrderUpdateSummary> {
        let mut summary = OrderUpdateSummary::default();
        let mut seen = HashSet::new();

        for sighting in sightings {
            if sighting.location.is_empty() {
                continue;
            }

            let seen_at = sighting.seen_at_text();
            if !seen.insert((sighting.key.clone(), sighting.location.clone(), seen_at.clone())) {
                continue;
            }

            let key = &sighting.key;
            let ids = match self.find_record_ids(key).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(%key, error = %e, "order lookup failed");
                    summary.skipped.push(format!("{{{}}}: ERROR ({})", key, e));
                    continue;
                }
            };

            if ids.is_empty() {
                summary.skipped.push(format!(
                    "{{{}}}: 0 matches (formula: {})",
                    key,
                    self.formula(key)
                ));
                continue;
            }

            match self
                .update_location(&ids, &sighting.location, Some(&seen_at))
                .await
            {
                Ok(updated) => summary.updated_records += updated,
                Err(e) => {
                    warn!(%key, error = %e, "order update failed");
                    summary.skipped.push(format!("{{{}}}: ERROR ({})", key, e));
                }
            }
        }

        info!(
            updated_records = summary.updated_records,
            skipped = summary.skipped.len(),
            "order sightings applied"
        );
        Ok(summary)
    }

    fn table_url(&self) -> NukigataResult<url::Url> {
        endpoint(&self.base_url, &[&self.base_id, &self.table])
    }
}
