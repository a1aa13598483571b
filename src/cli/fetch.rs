//! `gamegate fetch`

use gamegate::error::Result;
use gamegate::{Config, Gateway};

use crate::cli::OutputFormat;

pub async fn run(
    resource_type: &str,
    region: &str,
    path: &str,
    params: &[(String, String)],
    refresh: bool,
    format: OutputFormat,
    config_path: Option<&str>,
) -> Result<()> {
    let config = Config::load_at(config_path)?;
    let gateway = Gateway::from_config(config)?;

    let result = gateway
        .fetch(resource_type, region, path, params, refresh)
        .await;
    // The process exits right after; let the cache write land first
    gateway.shutdown().await;

    let payload = result?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&payload)?),
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}
