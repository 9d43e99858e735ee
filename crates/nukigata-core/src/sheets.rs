//! Die metadata sheet: lookup by key and location/last-seen updates.
//!
//! Columns are resolved by the header row, so the sheet may be reordered
//! without touching this code. Header names are case-sensitive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::TokenProvider;
use crate::error::{NukigataError, NukigataResult};
use crate::transport::{check_status, endpoint, RetryingTransport};
use crate::types::{normalize_workcode, LookupKey, Sighting};

const SERVICE: &str = "sheets";

/// Range read for lookups; the first row must be the header.
pub const DIE_SHEET_RANGE: &str = "A1:Z10000";

pub const WORKCODE_COLUMN: &str = "WorkCord";
pub const BOOK_COLUMN: &str = "BookName";
pub const LOCATION_COLUMN: &str = "Location";
pub const LAST_SEEN_COLUMN: &str = "LastSeen";
/// Die name column; older sheets label it `WorkName`.
pub const ITEM_NAME_COLUMN: &str = "ItemName";
pub const WORK_NAME_COLUMN: &str = "WorkName";

/// Quote a worksheet name for use in an A1 range when it is not a plain
/// identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Column letters for a zero-based index (`0 -> A`, `26 -> AA`).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Render an unformatted cell value as text.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                normalize_workcode(&n.to_string())
            }
        }
        other => other.to_string(),
    }
}

/// Header row lookup.
struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    fn new(row: &[String]) -> Self {
        let mut columns = HashMap::new();
        for (i, name) in row.iter().enumerate() {
            columns.entry(name.trim().to_string()).or_insert(i);
        }
        Self { columns }
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    fn require(&self, name: &str) -> NukigataResult<usize> {
        self.index(name).ok_or_else(|| {
            NukigataError::config(format!("sheet header has no {} column", name))
        })
    }

    fn get<'a>(&self, row: &'a [String], name: &str) -> &'a str {
        self.index(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One die row from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRow {
    /// 1-based sheet row.
    pub row_number: usize,
    pub workcode: String,
    pub book: String,
    pub item_name: String,
    pub kname: String,
    pub material: String,
    pub paper_size: String,
    pub cut_size: String,
    pub location: String,
    pub last_seen: String,
    pub ndate: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingSummary {
    pub updated_cells: usize,
    pub appended_rows: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    transport: RetryingTransport,
    tokens: TokenProvider,
    base_url: String,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsClient {
    pub fn new(
        transport: RetryingTransport,
        tokens: TokenProvider,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            base_url: crate::config::DEFAULT_SHEETS_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    /// `range` qualified with the worksheet name.
    pub fn range(&self, a1: &str) -> String {
        format!("{}!{}", quote_sheet_name(&self.worksheet), a1)
    }

    /// Read `range` as rows of text cells.
    pub async fn read_values(&self, range: &str) -> NukigataResult<Vec<Vec<String>>> {
        let mut url = endpoint(
            &self.base_url,
            &["spreadsheets", &self.spreadsheet_id, "values", range],
        )?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        debug!(range, "reading sheet values");
        let token = self.tokens.bearer().await?;
        let request = self
            .transport
            .client()
            .get(url)
            .bearer_auth(&token)
            .build()?;

        let response = check_status(SERVICE, self.transport.send(request).await?).await?;
        let body: ValueRange =
            response
                .json()
                .await
                .map_err(|e| NukigataError::InvalidResponse {
                    message: format!("failed to parse sheet values: {}", e),
                })?;

        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    /// First data row matching `key`, if any.
    pub async fn find_die(&self, key: &LookupKey) -> NukigataResult<Option<DieRow>> {
        let rows = self.read_values(&self.range(DIE_SHEET_RANGE)).await?;
        let Some((header_row, data)) = rows.split_first() else {
            return Ok(None);
        };

        let header = Header::new(header_row);
        header.require(WORKCODE_COLUMN)?;
        header.require(BOOK_COLUMN)?;

        for (i, row) in data.iter().enumerate() {
            let workcode = normalize_workcode(header.get(row, WORKCODE_COLUMN));
            let book = header.get(row, BOOK_COLUMN).trim();

            if workcode == key.workcode() && book == key.book() {
                return Ok(Some(DieRow {
                    row_number: i + 2,
                    workcode,
                    book: book.to_string(),
                    item_name: header.get(row, ITEM_NAME_COLUMN).to_string(),
                    kname: header.get(row, "Kname").to_string(),
                    material: header.get(row, "Material").to_string(),
                    paper_size: header.get(row, "Paper_Size").to_string(),
                    cut_size: header.get(row, "Cut_Size").to_string(),
                    location: header.get(row, LOCATION_COLUMN).to_string(),
                    last_seen: header.get(row, LAST_SEEN_COLUMN).to_string(),
                    ndate: header.get(row, "Ndate").to_string(),
                }));
            }
        }

        Ok(None)
    }

    /// Write each sighting's location and time to its row, appending rows for
    /// keys the sheet does not have yet. A later sighting of the same key in
    /// one batch overwrites an earlier one.
    pub async fn record_sightings(
        &self,
        sightings: &[Sighting],
    ) -> NukigataResult<SightingSummary> {
        if sightings.is_empty() {
            return Ok(SightingSummary::default());
        }

        let rows = self.read_values(&self.range(DIE_SHEET_RANGE)).await?;
        let Some((header_row, data)) = rows.split_first() else {
            return Err(NukigataError::config("sheet has no header row"));
        };

        let header = Header::new(header_row);
        let wc_col = header.require(WORKCODE_COLUMN)?;
        let book_col = header.require(BOOK_COLUMN)?;
        let loc_col = header.require(LOCATION_COLUMN)?;
        let seen_col = header.require(LAST_SEEN_COLUMN)?;
        let name_col = header
            .index(ITEM_NAME_COLUMN)
            .or_else(|| header.index(WORK_NAME_COLUMN));
        if name_col.is_none() && sightings.iter().any(|s| s.work_name.is_some()) {
            header.require(ITEM_NAME_COLUMN)?;
        }

        let mut existing: HashMap<(String, String), usize> = HashMap::new();
        for (i, row) in data.iter().enumerate() {
            let key = (
                normalize_workcode(header.get(row, WORKCODE_COLUMN)),
                header.get(row, BOOK_COLUMN).trim().to_string(),
            );
            existing.entry(key).or_insert(i + 2);
        }

        let width = [Some(wc_col), Some(book_col), Some(loc_col), Some(seen_col), name_col]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(0)
            + 1;

        let mut updates: Vec<Value> = Vec::new();
        let mut appends: Vec<Vec<String>> = Vec::new();
        let mut pending: HashMap<(String, String), usize> = HashMap::new();

        for sighting in sightings {
            let key = (
                sighting.key.workcode().to_string(),
                sighting.key.book().to_string(),
            );
            let seen = sighting.seen_at_text();
            let name = name_col.zip(sighting.work_name.as_ref());

            if let Some(&row_number) = existing.get(&key) {
                let cells = name
                    .into_iter()
                    .chain([(loc_col, &sighting.location), (seen_col, &seen)]);
                for (col, value) in cells {
                    updates.push(json!({
                        "range": self.range(&format!("{}{}", column_letter(col), row_number)),
                        "values": [[value]],
                    }));
                }
            } else {
                let idx = match pending.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let mut row = vec![String::new(); width];
                        row[wc_col] = key.0.clone();
                        row[book_col] = key.1.clone();
                        pending.insert(key, appends.len());
                        appends.push(row);
                        appends.len() - 1
                    }
                };
                let row = &mut appends[idx];
                row[loc_col] = sighting.location.clone();
                row[seen_col] = seen;
                if let Some((col, value)) = name {
                    row[col] = value.clone();
                }
            }
        }

        let summary = SightingSummary {
            updated_cells: updates.len(),
            appended_rows: appends.len(),
        };

        if !updates.is_empty() {
            self.batch_update(updates).await?;
        }
        if !appends.is_empty() {
            let range = self.range(&format!("A:{}", column_letter(width - 1)));
            self.append_rows(&range, appends).await?;
        }

        info!(
            updated_cells = summary.updated_cells,
            appended_rows = summary.appended_rows,
            "sheet sightings recorded"
        );
        Ok(summary)
    }

    async fn batch_update(&self, data: Vec<Value>) -> NukigataResult<()> {
        let url = endpoint(
            &self.base_url,
            &["spreadsheets", &self.spreadsheet_id, "values:batchUpdate"],
        )?;
        let body = json!({ "valueInputOption": "RAW", "data": data });

        let token = self.tokens.bearer().await?;
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .build()?;

        check_status(SERVICE, self.transport.send(request).await?).await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: Vec<Vec<String>>) -> NukigataResult<()> {
        let mut url = endpoint(
            &self.base_url,
            &[
                "spreadsheets",
                &self.spreadsheet_id,
                "values",
                &format!("{}:append", range),
            ],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let token = self.tokens.bearer().await?;
        let request = self
            .transport
            .client()
            .post(url)
            .bearer_auth(&token)
            .json(&json!({ "values": rows }))
            .build()?;

        check_status(SERVICE, self.transport.send(request).await?).await?;
        Ok(())
    }
}
