//! Config file resolution.

use std::path::PathBuf;

use anyhow::{Result, bail};

/// Environment variable naming the config file directly.
pub const CONFIG_ENV: &str = "EPGMGR_CONFIG";

/// Resolves the config file path.
///
/// First match wins:
/// 1. `{dir}/config.toml` when `--dir` is given
/// 2. `$EPGMGR_CONFIG`
/// 3. `$XDG_CONFIG_HOME/epgmgr/config.toml`
/// 4. `~/.config/epgmgr/config.toml`
///
/// # Errors
///
/// Returns an error if none of the above can be determined.
pub fn resolve_config_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
    resolve_with(dir, |key| std::env::var(key).ok())
}

/// Resolution with an injectable environment lookup.
fn resolve_with<F>(dir: Option<&PathBuf>, env: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(d) = dir {
        return Ok(d.join("config.toml"));
    }

    let set = |key: &str| env(key).filter(|value| !value.is_empty());
    if let Some(file) = set(CONFIG_ENV) {
        return Ok(PathBuf::from(file));
    }
    if let Some(xdg) = set("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("epgmgr").join("config.toml"));
    }
    let Some(home) = set("HOME") else {
        bail!("cannot locate config: set --dir, {CONFIG_ENV} or HOME");
    };
    Ok(PathBuf::from(home)
        .join(".config")
        .join("epgmgr")
        .join("config.toml"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    type Pairs = &'static [(&'static str, &'static str)];

    fn env_of(pairs: Pairs) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| String::from(*v))
        }
    }

    #[test]
    fn test_resolve_with_dir() {
        // Arrange
        let dir = PathBuf::from("/srv/epgmgr");
        let env = env_of(&[(CONFIG_ENV, "/etc/epgmgr.toml")]);

        // Act
        let path = resolve_with(Some(&dir), env).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/srv/epgmgr/config.toml"));
    }

    #[test]
    fn test_resolve_env_file_beats_xdg() {
        // Arrange
        let env = env_of(&[
            (CONFIG_ENV, "/etc/epgmgr.toml"),
            ("XDG_CONFIG_HOME", "/home/tv/.xdg"),
            ("HOME", "/home/tv"),
        ]);

        // Act
        let path = resolve_with(None, env).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/etc/epgmgr.toml"));
    }

    #[test]
    fn test_resolve_xdg_config_home() {
        // Arrange
        let env = env_of(&[("XDG_CONFIG_HOME", "/home/tv/.xdg"), ("HOME", "/home/tv")]);

        // Act
        let path = resolve_with(None, env).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/home/tv/.xdg/epgmgr/config.toml"));
    }

    #[test]
    fn test_resolve_home_ignores_empty_xdg() {
        // Arrange
        let env = env_of(&[("XDG_CONFIG_HOME", ""), ("HOME", "/home/tv")]);

        // Act
        let path = resolve_with(None, env).unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/home/tv/.config/epgmgr/config.toml"));
    }

    #[test]
    fn test_resolve_fails_without_home() {
        // Arrange & Act
        let result = resolve_with(None, env_of(&[]));

        // Assert
        assert!(result.unwrap_err().to_string().contains(CONFIG_ENV));
    }
}
