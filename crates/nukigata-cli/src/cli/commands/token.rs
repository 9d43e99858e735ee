use std::path::Path;

use serde_json::json;

use super::{load_service, print_json};
use crate::exit_codes;

pub async fn run(config: Option<&Path>) -> anyhow::Result<i32> {
    let service = load_service(config)?;
    let token = service.token().await?;

    print_json(&json!({
        "access_token": token.value,
        "expires_at": token.expires_at.to_rfc3339(),
    }))?;
    Ok(exit_codes::SUCCESS)
}
