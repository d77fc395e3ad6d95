use std::fs;
use std::path::Path;

use invenio_deploy::env::{EnvParams, Registry};
use invenio_deploy::Site;
use serde_json::Value;
use tempfile::TempDir;

/// A site file plus templates in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub site: Site,
}

impl Fixture {
    pub fn new(site: Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invenio-deploy.json");
        fs::write(&path, serde_json::to_string_pretty(&site).unwrap()).unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        let site = Site::load(&path).unwrap();
        Self { dir, site }
    }

    pub fn template(self, name: &str, content: &str) -> Self {
        let path = self.dir.path().join("templates").join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    pub fn registry(&self, env: &str) -> Registry {
        Registry::from_site(&self.site, env, &EnvParams::default()).unwrap()
    }

    #[allow(dead_code)]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Site with one local environment rooted at `/opt/atlantis`.
pub fn local_site(extra: Value) -> Value {
    let mut env = serde_json::json!({
        "user": "deploy",
        "invenio_user": "deploy",
        "prefix": "/opt/atlantis",
        "database": {"password": "pw", "root_password": "rootpw"}
    });
    merge(&mut env, extra);

    serde_json::json!({
        "name": "atlantis",
        "default_environment": "loc",
        "environments": {"loc": env}
    })
}

fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Index of the first recorded line containing `pattern`.
#[allow(dead_code)]
pub fn position(lines: &[String], pattern: &str) -> usize {
    lines
        .iter()
        .position(|l| l.contains(pattern))
        .unwrap_or_else(|| panic!("no command containing {:?} in {:#?}", pattern, lines))
}
