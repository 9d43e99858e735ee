use std::path::Path;

use anyhow::Context;
use serde_json::json;

use super::super::args::FetchArgs;
use super::{load_service, print_json};
use crate::exit_codes;

pub async fn run(args: FetchArgs, config: Option<&Path>) -> anyhow::Result<i32> {
    let service = load_service(config)?;
    let media = service.fetch_media(&args.id).await?;

    tokio::fs::write(&args.out, &media.bytes)
        .await
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    print_json(&json!({
        "id": args.id,
        "content_type": media.content_type,
        "bytes": media.bytes.len(),
        "out": args.out.display().to_string(),
    }))?;
    Ok(exit_codes::SUCCESS)
}
