//! File utility functions

use std::path::PathBuf;

/// Expand a leading `~` to the home directory and make the path absolute
/// relative to the current working directory.
///
/// ```text
/// expand_path("~/.metricstore/metricstore.json") // -> /home/user/.metricstore/metricstore.json
/// expand_path("batches/identity.json")            // -> /current/dir/batches/identity.json
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    let expanded = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}
