//! Example demonstrating layered loading, validation and live reload.
//!
//! This example shows how to:
//! - Combine defaults, a YAML file and `SYNX_*` environment overrides
//! - Bind the settings into a validated schema
//! - Reload automatically when the file changes
//!
//! Run with: cargo run --example run_config
//!
//! While running, edit demos/config/run_config.yaml, or restart with
//! `SYNX_SERVER_PORT=9000` to see the environment win. Set `RUST_LOG=debug`
//! for the library's own events.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strata_config::prelude::*;
use tracing_subscriber::EnvFilter;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
struct AppConfig {
    #[validate(nested)]
    server: ServerConfig,
    #[validate(nested)]
    db: DatabaseConfig,
}

#[derive(Debug, Deserialize, Validate)]
struct ServerConfig {
    #[validate(range(min = 1, max = 65535))]
    port: u16,
    #[validate(length(min = 1))]
    host: String,
}

#[derive(Debug, Deserialize, Validate)]
struct DatabaseConfig {
    #[validate(range(min = 1, max = 65535))]
    port: u16,
    #[validate(range(min = 1, max = 100))]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Layered Config Example ===\n");

    // Create an initial config file if it doesn't exist
    let config_path = Path::new("demos/config/run_config.yaml");
    if !config_path.exists() {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(
            config_path,
            r#"server:
  port: 8080
  host: localhost

db:
  max_connections: 10
"#,
        )?;
        println!("Created {}", config_path.display());
    }

    let config = ConfigManager::builder()
        .with_file(config_path)
        .with_env_prefix("SYNX")
        .with_default("server.port", 9999)
        .with_default("db.port", 5432)
        .with_default("db.max_connections", 5)
        .with_debounce(Duration::from_millis(250))
        .with_schema::<AppConfig>()
        .build()?;

    config.load().await?;
    print_config(&config);

    // Track the number of reloads
    let reload_count = Arc::new(AtomicUsize::new(0));
    let reload_count_clone = Arc::clone(&reload_count);
    let handle = config.clone();

    let token = CancellationToken::new();
    config.watch(token.clone(), move || {
        let count = reload_count_clone.fetch_add(1, Ordering::SeqCst) + 1;
        println!("\n[Event] Configuration changed (event #{})", count);
        print_config(&handle);
    })?;

    println!("\nWatching {} (Ctrl+C to exit)", config_path.display());

    tokio::signal::ctrl_c().await?;

    token.cancel();
    config.close()?;
    println!(
        "\nStopped after {} change events",
        reload_count.load(Ordering::SeqCst)
    );
    Ok(())
}

fn print_config(config: &ConfigManager<AppConfig>) {
    match config.get_schema() {
        Some(cfg) => {
            println!("Current configuration:");
            println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
            println!(
                "  Database port: {} (max connections: {})",
                cfg.db.port, cfg.db.max_connections
            );
        }
        None => println!("No valid configuration loaded yet"),
    }
}
