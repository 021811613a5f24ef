use std::env;
use std::path::PathBuf;

use catalog::{run_cleanup, Catalog, CleanupOptions};
use common::CleanupMode;
use server::config::{config_path_from_env, load_or_create_config};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cleanup [--full] [--config PATH]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut mode = CleanupMode::DryRun;
    let mut config_path = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--full" => mode = CleanupMode::Full,
            "--dry-run" => mode = CleanupMode::DryRun,
            "--config" => {
                let value = args.next().ok_or(USAGE)?;
                config_path = Some(PathBuf::from(value));
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other => return Err(format!("unexpected argument: {}\n{}", other, USAGE).into()),
        }
    }

    let config_path = config_path.unwrap_or_else(config_path_from_env);
    let (config, _) = load_or_create_config(&config_path)?;
    let catalog = Catalog::open(&config.catalog_path(&config_path))?;
    let layout = config.storage_layout(&config_path);

    let options = CleanupOptions {
        mode,
        preview_limit: config.orphan_preview_limit,
    };
    let report = run_cleanup(&catalog, &layout, options)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
