use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "cloudglide";

fn home_dir() -> Option<PathBuf> {
    let home = if cfg!(target_os = "windows") {
        env::var_os("USERPROFILE").or_else(|| env::var_os("HOME"))
    } else {
        env::var_os("HOME")
    };
    home.filter(|value| !value.is_empty()).map(PathBuf::from)
}

/// Per-user configuration directory.
///
/// `XDG_CONFIG_HOME` takes precedence when set. Otherwise macOS uses
/// `~/Library/Application Support` and other platforms `~/.config`.
pub fn cloudglide_config_dir() -> Option<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(xdg).join(APP_DIR));
    }

    let home = home_dir()?;
    let base = if cfg!(target_os = "macos") {
        home.join("Library").join("Application Support")
    } else {
        home.join(".config")
    };
    Some(base.join(APP_DIR))
}

/// Encrypted account store, see [`crate::vault`].
pub fn vault_path() -> Option<PathBuf> {
    cloudglide_config_dir().map(|dir| dir.join("accounts.enc"))
}

/// Resolve a leading `~/` against the home directory.
pub fn expand_user_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
