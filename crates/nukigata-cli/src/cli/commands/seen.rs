use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use nukigata_core::{LookupKey, Sighting};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing::warn;

use super::super::args::SeenArgs;
use super::{load_service, print_json};
use crate::exit_codes;

/// One scanned item as posted by the scanner page.
#[derive(Debug, Deserialize)]
struct SeenItem {
    #[serde(default)]
    book: String,
    #[serde(default)]
    wc: Value,
    #[serde(default)]
    loc: String,
    /// Die name, written to the sheet when present.
    #[serde(default)]
    wn: String,
    #[serde(default, alias = "lastSeen")]
    captured_at: Option<String>,
}

fn parse_seen_at(raw: Option<&str>, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid timestamp {:?}", s))?
            .with_timezone(&Utc)),
        None => Ok(now),
    }
}

fn workcode_text(wc: &Value) -> String {
    match wc {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Turn items into sightings; unusable items are returned as messages.
fn sightings_from_items(items: &[SeenItem], now: DateTime<Utc>) -> (Vec<Sighting>, Vec<String>) {
    let mut sightings = Vec::new();
    let mut rejected = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let key = match LookupKey::new(&item.book, workcode_text(&item.wc)) {
            Ok(key) => key,
            Err(e) => {
                rejected.push(format!("item {}: {}", i, e));
                continue;
            }
        };
        if item.loc.trim().is_empty() {
            rejected.push(format!("item {} ({}): location is empty", i, key));
            continue;
        }
        match parse_seen_at(item.captured_at.as_deref(), now) {
            Ok(at) => sightings.push(Sighting::new(key, &item.loc, at).with_work_name(&item.wn)),
            Err(e) => rejected.push(format!("item {} ({}): {:#}", i, key, e)),
        }
    }

    (sightings, rejected)
}

async fn read_items(path: &Path) -> anyhow::Result<Vec<SeenItem>> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read stdin")?;
        raw
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?
    };

    // Accept a bare array or the `{"items": [...]}` request body.
    let value: Value = serde_json::from_str(&raw).context("items are not valid JSON")?;
    let items = match value {
        Value::Object(mut obj) => obj.remove("items").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(items).context("items must be an array of {book, wc, loc}")
}

pub async fn run(args: SeenArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let now = Utc::now();

    let (sightings, rejected) = match (&args.items, &args.book) {
        (Some(path), _) => sightings_from_items(&read_items(path).await?, now),
        (None, Some(book)) => {
            let key = LookupKey::new(book, args.workcode.as_deref().unwrap_or_default())?;
            let at = parse_seen_at(args.at.as_deref(), now)?;
            let loc = args.loc.as_deref().unwrap_or_default();
            if loc.trim().is_empty() {
                anyhow::bail!("--loc is empty");
            }
            let sighting = Sighting::new(key, loc, at)
                .with_work_name(args.work_name.as_deref().unwrap_or_default());
            (vec![sighting], Vec::new())
        }
        (None, None) => anyhow::bail!("either --items or --book/--wc/--loc is required"),
    };

    for reason in &rejected {
        warn!(reason = %reason, "item rejected");
    }

    let service = load_service(config)?;

    let sheet = if args.target.sheet() {
        Some(service.sheets()?.record_sightings(&sightings).await?)
    } else {
        None
    };

    let orders = if args.target.orders() {
        Some(service.orders()?.apply_sightings(&sightings).await?)
    } else {
        None
    };

    print_json(&json!({
        "sightings": sightings.len(),
        "rejected": rejected,
        "sheet": sheet,
        "orders": orders,
    }))?;

    Ok(exit_codes::SUCCESS)
}
