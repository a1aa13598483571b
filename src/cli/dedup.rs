//! `gamegate dedup` commands

use std::sync::Arc;

use gamegate::cache::SqliteStore;
use gamegate::error::Result;
use gamegate::ledger::DedupLedger;

use crate::cli::{OutputFormat, local_config};

fn open_ledger(config_path: Option<&str>) -> Result<DedupLedger> {
    let config = local_config(config_path)?;
    let store = Arc::new(SqliteStore::open_or_default(config.cache.path.as_deref())?);
    Ok(DedupLedger::new(
        store.clone(),
        store,
        config.namespace,
        config.dedup.marker_ttl(),
    ))
}

pub async fn mark(set: &str, id: &str, format: OutputFormat, config_path: Option<&str>) -> Result<()> {
    open_ledger(config_path)?.mark(set, id).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "set": set, "id": id, "marked": true });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty => println!("Marked {} in {}", id, set),
    }
    Ok(())
}

/// Returns whether the item is marked; the caller maps `false` to exit code 2
pub async fn check(set: &str, id: &str, format: OutputFormat, config_path: Option<&str>) -> Result<bool> {
    let marked = open_ledger(config_path)?.is_marked(set, id).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "set": set, "id": id, "marked": marked });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty if marked => println!("{} is marked in {}", id, set),
        OutputFormat::Pretty => println!("{} is not marked in {}", id, set),
    }
    Ok(marked)
}
