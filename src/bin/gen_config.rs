//! Writes a default configuration file.
//!
//! Usage: `gen_config [PATH]` (defaults to `config.json`)

use std::env;
use std::fs;

use anyhow::Context;

use edge_cache::Config;

fn main() -> anyhow::Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| "config.json".to_string());

    let mut config = Config::default();
    config
        .headers
        .insert("Cache-Control".to_string(), format!("max-age={}", config.ttl_secs));

    let json = serde_json::to_string_pretty(&config).context("failed to serialize config")?;
    fs::write(&path, json + "\n").with_context(|| format!("failed to write {}", path))?;

    println!("Wrote default configuration to {}", path);
    Ok(())
}
