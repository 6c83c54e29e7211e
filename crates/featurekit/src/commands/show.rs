//! `featurekit show`

use anyhow::Result;
use featurekit_core::repository::Repository;
use std::fmt;
use tracing::debug;

use super::RepositoryOptions;

/// No installed feature answers to the requested name
#[derive(Debug)]
pub struct FeatureNotFound(pub String);

impl fmt::Display for FeatureNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feature not found: {}", self.0)
    }
}

impl std::error::Error for FeatureNotFound {}

#[derive(Debug, Clone)]
pub struct ShowArgs {
    pub options: RepositoryOptions,
    pub name: String,
}

pub fn execute_show(args: ShowArgs) -> Result<()> {
    let mut repository = args.options.open()?;

    let definition = match repository.get_feature(&args.name) {
        Some(definition) => Some(definition),
        None => repository
            .matches_alternate(&args.name)
            .map(str::to_string)
            .and_then(|name| {
                debug!(alias = %args.name, %name, "Resolved alternate name");
                repository.get_feature(&name)
            }),
    };
    let Some(definition) = definition else {
        repository.dispose();
        return Err(FeatureNotFound(args.name).into());
    };

    let attributes = definition.attributes();
    println!("Name:            {}", definition.feature_name());
    println!("Symbolic name:   {}", definition.symbolic_name());
    println!("Version:         {}", definition.version());
    println!("Visibility:      {}", definition.visibility().as_str());
    if !attributes.bundle_repository_type.is_empty() {
        println!("Repository:      {}", attributes.bundle_repository_type);
    }
    if let Some(file) = definition.feature_file() {
        println!("File:            {}", file.display());
    }
    let process_types: Vec<&str> = attributes.process_types.iter().map(|p| p.as_str()).collect();
    println!("Process types:   {}", process_types.join(", "));
    println!("Auto feature:    {}", definition.is_auto_feature());
    println!("Singleton:       {}", attributes.is_singleton);
    if !attributes.alternate_names.is_empty() {
        println!("Also known as:   {}", attributes.alternate_names.join(", "));
    }
    if !attributes.platforms.is_empty() {
        println!("Platforms:       {}", attributes.platforms.join(", "));
    }
    if let Some(by) = definition.superseded_by() {
        println!("Superseded by:   {}", by);
    } else if definition.is_superseded() {
        println!("Superseded:      true");
    }

    let constituents = definition.constituents(None);
    if !constituents.is_empty() {
        println!("Content:");
        for resource in constituents {
            match resource.version_range() {
                Some(range) => println!(
                    "  {} ({}) {}",
                    resource.symbolic_name(),
                    resource.content_type().as_str(),
                    range
                ),
                None => println!(
                    "  {} ({})",
                    resource.symbolic_name(),
                    resource.content_type().as_str()
                ),
            }
        }
    }

    drop(definition);
    repository.dispose();
    Ok(())
}
