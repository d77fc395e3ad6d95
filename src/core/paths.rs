use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// File names probed, in order, when no `--site` is given.
pub const SITE_FILE_CANDIDATES: &[&str] = &[
    "invenio-deploy.json",
    "invenio-deploy.toml",
    "invenio-deploy.yaml",
    "invenio-deploy.yml",
];

/// Base config directory (~/.config/invenio-deploy/ on all platforms)
pub fn config_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("invenio-deploy"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("invenio-deploy"))
    }
}

/// Global config.json path
pub fn config_json() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Directory holding virtualenvs when no prefix is configured
/// (`$WORKON_HOME`, falling back to `~/envs`).
pub fn workon_home() -> String {
    match env::var("WORKON_HOME") {
        Ok(dir) if !dir.is_empty() => dir,
        _ => shellexpand::tilde("~/envs").to_string(),
    }
}

/// Find the site definition file in `dir`.
pub fn discover_site_file(dir: &Path) -> Option<PathBuf> {
    SITE_FILE_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Template directory next to a site definition file.
pub fn templates_dir(site_file: &Path) -> PathBuf {
    site_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("templates")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_prefers_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("invenio-deploy.toml"), "").unwrap();
        std::fs::write(dir.path().join("invenio-deploy.json"), "{}").unwrap();

        let found = discover_site_file(dir.path()).unwrap();
        assert!(found.ends_with("invenio-deploy.json"));
    }

    #[test]
    fn discover_returns_none_for_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_site_file(dir.path()).is_none());
    }

    #[test]
    fn templates_dir_is_sibling_of_site_file() {
        let path = Path::new("/srv/atlantis/invenio-deploy.json");
        assert_eq!(templates_dir(path), PathBuf::from("/srv/atlantis/templates"));
    }
}
