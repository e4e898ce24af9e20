//! Selection of the manifest entries a depot's patterns ask for.

use tracing::debug;

use crate::manifest::ManifestEntry;
use crate::patterns::PatternRegistry;

/// Entries of `files` whose path matches the depot's patterns, in manifest
/// order. An untracked depot selects nothing.
pub fn select<'m>(
    registry: &PatternRegistry,
    depot_id: u32,
    files: &'m [ManifestEntry],
) -> Vec<&'m ManifestEntry> {
    let Some(matcher) = registry.matcher_for(depot_id) else {
        debug!(depot_id, "Depot is not tracked, selecting nothing");
        return Vec::new();
    };

    let selected: Vec<&ManifestEntry> = files
        .iter()
        .filter(|entry| matcher.is_match(&entry.path))
        .collect();

    debug!(
        depot_id,
        selected = selected.len(),
        total = files.len(),
        "Selected files from manifest"
    );
    selected
}
