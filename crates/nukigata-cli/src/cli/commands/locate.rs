use std::path::Path;

use serde_json::json;

use super::super::args::LocateArgs;
use super::{load_service, lookup_key, print_json};
use crate::exit_codes;

pub async fn run(args: LocateArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let service = load_service(config)?;
    let key = lookup_key(&args.key)?;

    let result = match args.root.as_deref() {
        Some(root) => service.locate_in(&key, root).await?,
        None => service.locate(&key).await?,
    };

    print_json(&json!({
        "key": key,
        "found": result.found,
        "rule": result.rule,
        "candidates": result.candidates,
        "folders_visited": result.folders_visited,
    }))?;

    Ok(if result.found {
        exit_codes::SUCCESS
    } else {
        exit_codes::NOT_FOUND
    })
}
