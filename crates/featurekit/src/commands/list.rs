//! `featurekit list`

use anyhow::Result;
use featurekit_core::attributes::Visibility;
use featurekit_core::repository::Repository;
use featurekit_core::FeatureDefinition;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::RepositoryOptions;

#[derive(Debug, Clone)]
pub struct ListArgs {
    pub options: RepositoryOptions,
    pub public_only: bool,
    pub json: bool,
}

/// One row of `list --json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    pub name: String,
    pub symbolic_name: String,
    pub version: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo_type: String,
    pub auto_feature: bool,
    pub kernel: bool,
}

impl FeatureRow {
    fn of(definition: &FeatureDefinition) -> Self {
        Self {
            name: definition.feature_name().to_string(),
            symbolic_name: definition.symbolic_name().to_string(),
            version: definition.version().to_string(),
            visibility: definition.visibility(),
            repo_type: definition.attributes().bundle_repository_type.clone(),
            auto_feature: definition.is_auto_feature(),
            kernel: definition.is_kernel(),
        }
    }
}

pub fn execute_list(args: ListArgs) -> Result<()> {
    let mut repository = args.options.open()?;

    let mut features: Vec<Arc<FeatureDefinition>> = if args.public_only {
        repository.select(&|d| d.visibility() == Visibility::Public)
    } else {
        repository.get_features()
    };
    features.sort_by(|a, b| a.feature_name().cmp(b.feature_name()));
    let rows: Vec<FeatureRow> = features.iter().map(|d| FeatureRow::of(d)).collect();
    info!(count = rows.len(), "Listed features");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let mut flags = Vec::new();
            if row.auto_feature {
                flags.push("auto");
            }
            if row.kernel {
                flags.push("kernel");
            }
            println!(
                "{:<40} {:<16} {:<10} {}",
                row.name,
                row.version,
                row.visibility.as_str(),
                flags.join(",")
            );
        }
    }

    repository.dispose();
    Ok(())
}
