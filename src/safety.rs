//! Safety checks for a run's writable paths.
//!
//! The converter truncates its unmatched report and rewrites its cache and
//! output files. These checks catch path mixups before anything is touched.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that the run's writable paths are usable.
///
/// Checks:
/// - output, cache, and unmatched-report paths must be pairwise distinct
/// - none of them may live inside the scanned input folder
pub fn validate_run_paths(
    data_folder: &Path,
    output: &Path,
    cache: &Path,
    unknowns: &Path,
) -> Result<()> {
    let writable = [("output", output), ("cache", cache), ("unknowns", unknowns)];

    for (i, (name_a, path_a)) in writable.iter().enumerate() {
        for (name_b, path_b) in writable.iter().skip(i + 1) {
            if path_a == path_b {
                bail!(
                    "Safety check failed: {} and {} files are the same path '{}'",
                    name_a,
                    name_b,
                    path_a.display()
                );
            }
        }
    }

    for (name, path) in writable {
        if path.starts_with(data_folder) {
            bail!(
                "Safety check failed: {} file '{}' is inside the input folder '{}'",
                name,
                path.display(),
                data_folder.display()
            );
        }
    }

    Ok(())
}
