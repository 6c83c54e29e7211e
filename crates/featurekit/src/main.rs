use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch() {
        Ok(()) => Ok(()),
        Err(err) => {
            // Unknown feature names exit with 2
            if let Some(commands::show::FeatureNotFound(name)) = err.downcast_ref() {
                eprintln!("Error: feature not found: {}", name);
                std::process::exit(2);
            }
            Err(err)
        }
    }
}
