//! `featurekit cache info|clear`

use anyhow::Result;
use featurekit_core::cache::CacheFile;
use featurekit_core::repository::FeatureRepository;
use tracing::info;

use super::RepositoryOptions;
use crate::cli::CacheCommands;

#[derive(Debug, Clone)]
pub struct CacheArgs {
    pub options: RepositoryOptions,
    pub command: CacheCommands,
}

pub fn execute_cache(args: CacheArgs) -> Result<()> {
    let config = args.options.build_config()?;
    match args.command {
        CacheCommands::Info => {
            let mut cache = CacheFile::new(config.cache_file.clone(), config.platform_support);
            match cache.path() {
                Some(path) => println!("Path:      {}", path.display()),
                None => {
                    println!("Caching disabled: no cache file configured");
                    return Ok(());
                }
            }
            println!("Version:   {}", cache.version());
            if !cache.is_readable() {
                println!("Status:    missing");
                return Ok(());
            }
            match cache.read() {
                Some(contents) => {
                    println!("Features:  {}", contents.features.len());
                    println!("Bad files: {}", contents.bad_files.len());
                    println!("Resolved:  {}", contents.resolved.len());
                    println!("Configured: {}", contents.configured.len());
                    if !contents.platforms.is_empty() {
                        println!("Platforms: {}", contents.platforms.join(", "));
                    }
                }
                None if cache.is_disabled() => println!("Status:    unreadable"),
                None => println!("Status:    ignored"),
            }
        }
        CacheCommands::Clear => {
            let mut repository = FeatureRepository::new(config);
            if repository.clear_cache()? {
                info!("Removed feature cache");
                println!("Cache cleared");
            } else {
                println!("No cache to clear");
            }
        }
    }
    Ok(())
}
