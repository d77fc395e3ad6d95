//! Template lookup and rendering.
//!
//! Templates live in the site's `templates/` directory; an environment
//! specific copy in `templates/<env>/` wins over the shared one. Absolute
//! paths are used as-is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::template;

#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Candidate paths for `name`, in lookup order.
    pub fn candidates(&self, env_name: &str, name: &str) -> Vec<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        vec![self.root.join(env_name).join(name), self.root.join(name)]
    }

    pub fn find(&self, env_name: &str, name: &str) -> Result<PathBuf> {
        let candidates = self.candidates(env_name, name);
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or_else(|| {
                Error::template_not_found(
                    name,
                    candidates.iter().map(|p| p.display().to_string()).collect(),
                )
            })
    }

    pub fn load(&self, env_name: &str, name: &str) -> Result<String> {
        let path = self.find(env_name, name)?;
        std::fs::read_to_string(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        })
    }

    /// Load and render a template. Unknown placeholders are kept and
    /// reported on stderr.
    pub fn render(
        &self,
        env_name: &str,
        name: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String> {
        let raw = self.load(env_name, name)?;
        let rendered = template::render_map(&raw, vars);

        let unresolved = template::unresolved(&rendered);
        if !unresolved.is_empty() {
            log_status!(
                "warn",
                "Template {} has unresolved variables: {}",
                name,
                unresolved.join(", ")
            );
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TemplateStore) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        std::fs::create_dir_all(root.join("prod")).unwrap();
        std::fs::write(root.join("invenio-local.conf"), "CFG_SITE_URL = http://{{host}}\n").unwrap();
        std::fs::write(root.join("prod").join("invenio-local.conf"), "prod {{host}}\n").unwrap();
        (dir, TemplateStore::new(root))
    }

    #[test]
    fn environment_copy_wins() {
        let (_dir, store) = store();
        let mut vars = HashMap::new();
        vars.insert("host".to_string(), "example.org".to_string());

        assert_eq!(
            store.render("prod", "invenio-local.conf", &vars).unwrap(),
            "prod example.org\n"
        );
        assert_eq!(
            store.render("loc", "invenio-local.conf", &vars).unwrap(),
            "CFG_SITE_URL = http://example.org\n"
        );
    }

    #[test]
    fn missing_template_lists_searched_paths() {
        let (_dir, store) = store();
        let err = store.find("loc", "celeryd").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::TemplateNotFound);
        assert_eq!(err.message, "Could not find template celeryd");
        assert_eq!(err.details["suggestions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn absolute_paths_bypass_lookup() {
        let (dir, store) = store();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, "Flask\n").unwrap();
        assert_eq!(
            store.load("loc", &path.display().to_string()).unwrap(),
            "Flask\n"
        );
    }
}
