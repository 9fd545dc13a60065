//! Config path resolution
//!
//! The config file lives next to the host executable unless
//! `FRAMEJACK_CONFIG` points somewhere else.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "FRAMEJACK_CONFIG";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "framejack.toml";

/// Returns the directory containing the host executable.
///
/// The library is injected into an arbitrary process, so this is the host's
/// directory, not ours.
pub fn host_base_dir() -> ConfigResult<PathBuf> {
    let exe = std::env::current_exe().map_err(ConfigError::IoError)?;
    exe.parent()
        .map(PathBuf::from)
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the core config path.
///
/// Path: `$FRAMEJACK_CONFIG`, or `<host dir>/framejack.toml`
pub fn core_config_path() -> ConfigResult<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(host_base_dir()?.join(CONFIG_FILE_NAME)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_is_next_to_executable() {
        if std::env::var_os(CONFIG_ENV).is_some() {
            return;
        }
        let path = core_config_path().unwrap();
        assert!(path.ends_with(CONFIG_FILE_NAME));
        assert_eq!(path.parent(), host_base_dir().ok().as_deref());
    }
}
