//! Cache management commands

use std::path::PathBuf;

use gamegate::cache::SqliteStore;
use gamegate::error::Result;

use crate::cli::{OutputFormat, local_config};

fn store_dir(config_path: Option<&str>) -> Result<PathBuf> {
    let config = local_config(config_path)?;
    match config.cache.path {
        Some(dir) => Ok(dir),
        None => Ok(SqliteStore::cache_dir()?),
    }
}

/// Show cache statistics
pub fn stats(format: OutputFormat, config_path: Option<&str>) -> Result<()> {
    let dir = store_dir(config_path)?;
    let stats = SqliteStore::open_at(&dir)?.stats()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "total_entries": stats.total_entries,
                "valid_entries": stats.valid_entries,
                "expired_entries": stats.expired_entries,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "dedup_markers": stats.dedup_markers,
                "ledger_members": stats.ledger_members,
                "path": dir.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", dir.display());
            println!(
                "Valid entries:  {} ({} dedup markers)",
                stats.valid_entries, stats.dedup_markers
            );
            println!("Expired:        {}", stats.expired_entries);
            println!("Total size:     {}", format_size(stats.total_size_bytes));
            println!("Ledger members: {}", stats.ledger_members);
        }
    }

    Ok(())
}

/// Remove expired entries. Ledger members are never touched.
pub fn purge(format: OutputFormat, config_path: Option<&str>) -> Result<()> {
    let dir = store_dir(config_path)?;
    let removed = SqliteStore::open_at(&dir)?.purge_expired()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pretty => {
            if removed > 0 {
                println!("Removed {} expired cache entries", removed);
            } else {
                println!("No expired entries");
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path(config_path: Option<&str>) -> Result<()> {
    println!("{}", store_dir(config_path)?.display());
    Ok(())
}

/// Format bytes as human-readable size
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
