//! Patterns command - show which depots the pattern file tracks.

use std::path::PathBuf;

use depotsync::PatternRegistry;

use super::common::{is_missing_file, resolve_config};
use crate::error::CliError;

/// Arguments for the patterns command.
pub struct PatternsArgs {
    pub config: Option<PathBuf>,
    pub files_dir: Option<PathBuf>,
}

/// Run the patterns command.
pub fn run(args: PatternsArgs) -> Result<(), CliError> {
    let config = resolve_config(args.config, args.files_dir)?;
    let path = &config.patterns_file;

    let registry = match PatternRegistry::load(path) {
        Ok(registry) => registry,
        Err(e) if is_missing_file(&e) => {
            println!("No pattern file at {}", path.display());
            println!("No depots are tracked; nothing will be downloaded.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Pattern file: {}", path.display());
    println!();
    print!("{}", describe(&registry));
    Ok(())
}

fn describe(registry: &PatternRegistry) -> String {
    if registry.is_empty() {
        return "No depots are tracked.\n".to_string();
    }

    let mut out = format!("{:<12} {}\n", "Depot", "Patterns");
    for depot_id in registry.depots() {
        let count = registry
            .matcher_for(depot_id)
            .map(|m| m.rules().len())
            .unwrap_or(0);
        out.push_str(&format!("{:<12} {}\n", depot_id, count));
    }
    out
}
