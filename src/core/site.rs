//! Site definition files.
//!
//! A site file (`invenio-deploy.json`, `.toml`, `.yaml` or `.yml`) replaces
//! the per-site fabfile: it names the instance, lists the python
//! interpreters and per-ref repository overrides, defines environments as
//! patches over the built-in defaults, and may declare script tasks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config;
use crate::env::{RepoOverride, Role};
use crate::error::{Error, Result};
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Prefix for generated instance names (`atlantis27maint1`).
    pub name: String,

    /// Python version → interpreter path, selected with `py=<version>`.
    #[serde(default)]
    pub pythons: BTreeMap<String, String>,

    /// Ref → target/requirement overrides applied when that ref is checked out.
    #[serde(default)]
    pub refs: BTreeMap<String, RepoOverride>,

    /// Repository that a bare `ref=` parameter applies to (first repo when unset).
    #[serde(default)]
    pub primary_repo: Option<String>,

    #[serde(default)]
    pub default_environment: Option<String>,

    /// Environment name → patch over the default environment.
    #[serde(default)]
    pub environments: BTreeMap<String, Value>,

    /// Site specific tasks built from shell steps.
    #[serde(default)]
    pub tasks: BTreeMap<String, ScriptTask>,

    #[serde(skip)]
    pub path: PathBuf,
}

/// A task declared in the site file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptTask {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub role: Option<Role>,

    pub steps: Vec<ScriptStep>,
}

/// One step of a script task. Strings are rendered as templates against the
/// environment variables, task keyword arguments and captured values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Sudo {
        sudo: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        capture: Option<String>,
        #[serde(default)]
        warn_only: bool,
    },
    Run {
        run: String,
        #[serde(default)]
        capture: Option<String>,
        #[serde(default)]
        warn_only: bool,
    },
    Local {
        local: String,
        #[serde(default)]
        capture: Option<String>,
        #[serde(default)]
        warn_only: bool,
    },
    Task {
        task: String,
    },
    Confirm {
        confirm: String,
    },
}

impl Site {
    /// Load a site definition from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::site_not_found(path.display().to_string()));
        }

        let raw = config::read_value(path)?;
        let mut site: Site = serde_json::from_value(raw).map_err(|e| {
            Error::config_parse_failed(path.display().to_string(), "site", e.to_string())
        })?;
        site.path = path.to_path_buf();
        site.validate()?;
        Ok(site)
    }

    /// Load `explicit` when given, otherwise look for a site file in `dir`.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
            return Self::load(Path::new(&expanded));
        }

        match paths::discover_site_file(dir) {
            Some(path) => Self::load(&path),
            None => Err(Error::site_not_found(
                dir.join(paths::SITE_FILE_CANDIDATES[0]).display().to_string(),
            )),
        }
    }

    /// Directory holding this site's templates.
    pub fn templates_dir(&self) -> PathBuf {
        paths::templates_dir(&self.path)
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Resolve a `py=` parameter to an interpreter.
    pub fn python(&self, version: &str) -> Result<String> {
        self.pythons
            .get(version)
            .map(|path| shellexpand::tilde(path).to_string())
            .ok_or_else(|| {
                Error::task_aborted(format!("Unknown Python version {}", version)).with_hint(
                    format!(
                        "Known versions: {}",
                        self.pythons.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
            })
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config_missing_key(
                "name",
                Some(self.path.display().to_string()),
            ));
        }

        for (name, patch) in &self.environments {
            if !patch.is_object() {
                return Err(Error::config_invalid_value(
                    format!("environments.{}", name),
                    None,
                    "Environment definition must be an object",
                ));
            }
        }

        if let Some(default) = &self.default_environment {
            if !self.environments.contains_key(default) {
                return Err(Error::config_invalid_value(
                    "default_environment",
                    Some(default.clone()),
                    "Default environment is not defined",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_json_site_with_script_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "invenio-deploy.json",
            r#"{
                "name": "inspireprod",
                "pythons": {"2.7": "/usr/bin/python2.7"},
                "environments": {"loc": {"roledefs": {"web": ["localhost"]}}},
                "tasks": {
                    "inspire_dbchanges": {
                        "description": "Perform INSPIRE db changes",
                        "steps": [
                            {"local": "make install-dbchanges"},
                            {"sudo": "bibsched status", "user": "apache"},
                            {"task": "apache_restart"},
                            {"confirm": "Continue?"}
                        ]
                    }
                }
            }"#,
        );

        let site = Site::load(&path).unwrap();
        assert_eq!(site.name, "inspireprod");
        assert_eq!(site.python("2.7").unwrap(), "/usr/bin/python2.7");

        let steps = &site.tasks["inspire_dbchanges"].steps;
        assert!(matches!(steps[0], ScriptStep::Local { .. }));
        assert!(matches!(&steps[1], ScriptStep::Sudo { user: Some(u), .. } if u == "apache"));
        assert!(matches!(steps[2], ScriptStep::Task { .. }));
        assert!(matches!(steps[3], ScriptStep::Confirm { .. }));
        assert_eq!(site.templates_dir(), dir.path().join("templates"));
    }

    #[test]
    fn loads_toml_site() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "invenio-deploy.toml",
            "name = \"atlantis\"\n[environments.loc]\ninstance = \"atlantis\"\n",
        );
        let site = Site::load(&path).unwrap();
        assert_eq!(site.environment_names(), vec!["loc".to_string()]);
    }

    #[test]
    fn unknown_python_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "invenio-deploy.yaml", "name: atlantis\n");
        let site = Site::load(&path).unwrap();
        let err = site.python("3.1").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::TaskAborted);
        assert_eq!(err.message, "Unknown Python version 3.1");
    }

    #[test]
    fn missing_site_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Site::discover(None, dir.path()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SiteNotFound);
    }

    #[test]
    fn undefined_default_environment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "invenio-deploy.json",
            r#"{"name": "atlantis", "default_environment": "prod"}"#,
        );
        let err = Site::load(&path).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigInvalidValue);
    }
}
