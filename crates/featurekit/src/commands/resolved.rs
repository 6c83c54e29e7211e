//! `featurekit resolved`
//!
//! Without `--set` this prints the resolved state restored from the cache.
//! With `--set` the given names become both the resolved and the configured
//! set, which is what a server records after a successful resolution.

use anyhow::Result;
use featurekit_core::repository::{lower_feature, FeatureRepository};
use std::collections::BTreeSet;
use tracing::info;

use super::RepositoryOptions;

#[derive(Debug, Clone)]
pub struct ResolvedArgs {
    pub options: RepositoryOptions,
    pub set: Option<Vec<String>>,
    pub platforms: Vec<String>,
}

pub fn execute_resolved(args: ResolvedArgs) -> Result<()> {
    let mut repository = args.options.open()?;

    if let Some(names) = &args.set {
        record(&mut repository, names, &args.platforms);
    }

    let state = repository.resolved_state();
    println!("Resolved features:");
    for name in &state.resolved {
        println!("  {}", name);
    }
    println!("Configured features:");
    for name in &state.configured {
        println!("  {}", name);
    }
    if !state.platforms.is_empty() {
        println!(
            "Platforms:         {}",
            state.platforms.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if let Some(env) = &state.platform_env_var {
        println!("Platform env var:  {}", env);
    }
    println!("Configuration error: {}", state.configuration_error);
    println!(
        "Up to date:        {}",
        repository.are_configured_features_good(
            &state.configured,
            &state.platforms,
            state.platform_env_var.as_deref()
        )
    );

    repository.dispose();
    Ok(())
}

fn record(repository: &mut FeatureRepository, names: &[String], platforms: &[String]) {
    let resolved: BTreeSet<String> = names
        .iter()
        .map(|n| {
            repository
                .symbolic_name_for(n)
                .map(str::to_string)
                .unwrap_or_else(|| n.clone())
        })
        .collect();
    let configured: BTreeSet<String> = names.iter().map(|n| lower_feature(n)).collect();
    let platforms: BTreeSet<String> = platforms.iter().map(|p| p.to_lowercase()).collect();
    info!(resolved = resolved.len(), "Recording resolved features");
    repository.set_resolved_features(resolved, configured, false, platforms, None);
    repository.store_cache();
}
