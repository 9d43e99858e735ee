use std::path::Path;

use serde_json::json;

use super::super::args::OrdersArgs;
use super::{load_service, lookup_key, print_json};
use crate::exit_codes;

pub async fn run(args: OrdersArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let service = load_service(config)?;
    let key = lookup_key(&args.key)?;
    let table = service.orders()?;

    let records = table.list_records(&key, args.limit).await?;
    print_json(&json!({
        "formula": table.formula(&key),
        "matched": records.len(),
        "records": records,
    }))?;

    Ok(if records.is_empty() {
        exit_codes::NOT_FOUND
    } else {
        exit_codes::SUCCESS
    })
}
