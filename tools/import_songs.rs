use std::env;
use std::path::PathBuf;

use catalog::{import_file, Catalog};
use server::config::{config_path_from_env, load_or_create_config};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let user_id = args
        .next()
        .ok_or("usage: import_songs <user_id> <file-or-dir>...")?;
    let inputs: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if inputs.is_empty() {
        return Err("no files or directories given".into());
    }

    let config_path = config_path_from_env();
    let (config, _) = load_or_create_config(&config_path)?;
    let catalog = Catalog::open(&config.catalog_path(&config_path))?;
    let layout = config.storage_layout(&config_path);
    let options = config.import_options();

    let mut imported = 0usize;
    let mut failed = 0usize;
    for input in inputs {
        for entry in WalkDir::new(&input).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry under {:?}: {}", input, err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !options.accepts(entry.path()) {
                continue;
            }
            match import_file(&catalog, &layout, entry.path(), &user_id, &options) {
                Ok(song) => {
                    imported += 1;
                    println!(
                        "{}\t{}",
                        song.id,
                        song.title.as_deref().unwrap_or("(untitled)")
                    );
                }
                Err(err) => {
                    failed += 1;
                    warn!("Failed to import {:?}: {}", entry.path(), err);
                }
            }
        }
    }

    println!("Imported {} songs ({} failed)", imported, failed);
    Ok(())
}
