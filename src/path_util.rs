use std::path::{self, Path, PathBuf};

/// Expands a path, replacing a leading `~` or `$HOME` with the user's home
/// directory, and makes it absolute against the current directory.
///
/// The path does not need to exist, so a missing source can still be
/// reported by the archive step.
pub fn expand_path(path: &Path) -> PathBuf {
    let expanded = expand_home(&path.to_string_lossy());
    path::absolute(&expanded).unwrap_or(expanded)
}

fn expand_home(input: &str) -> PathBuf {
    let rest = if input == "~" || input.starts_with("~/") {
        Some(&input[1..])
    } else if input == "$HOME" || input.starts_with("$HOME/") {
        Some(&input["$HOME".len()..])
    } else {
        None
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(input),
    }
}
