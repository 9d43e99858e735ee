use std::path::Path;

use anyhow::Context as _;
use nukigata_core::{DieService, LookupKey, NukigataConfig, ServiceIdentity};
use serde::Serialize;

use super::args::*;

mod dispatch;
pub mod fetch;
pub mod locate;
pub mod orders;
pub mod seen;
pub mod sheet;
pub mod token;

pub use dispatch::dispatch;

/// Build the service from `--config` (or the environment) plus the
/// service-account key from the environment.
pub(crate) fn load_service(config_path: Option<&Path>) -> anyhow::Result<DieService> {
    let config = match config_path {
        Some(path) => NukigataConfig::from_yaml_file(path)?,
        None => NukigataConfig::from_env(),
    };
    let identity = ServiceIdentity::from_env_if_present()?;
    Ok(DieService::new(config, identity)?)
}

pub(crate) fn lookup_key(args: &KeyArgs) -> anyhow::Result<LookupKey> {
    Ok(LookupKey::new(&args.book, &args.workcode)?)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
