use std::path::Path;

use super::super::args::KeyArgs;
use super::{load_service, lookup_key, print_json};
use crate::exit_codes;

pub async fn run(args: KeyArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let service = load_service(config)?;
    let key = lookup_key(&args)?;

    let row = service.sheets()?.find_die(&key).await?;
    print_json(&row)?;

    Ok(if row.is_some() {
        exit_codes::SUCCESS
    } else {
        exit_codes::NOT_FOUND
    })
}
