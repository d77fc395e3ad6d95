//! Environment registry.
//!
//! An environment is the full set of deployment variables for one
//! installation: hosts per role, paths, database credentials, repositories
//! and per-module settings. Environments are built from the defaults below,
//! patched with the site definition, then with command-line overrides.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::config;
use crate::error::{Error, Result};
use crate::paths;
use crate::site::Site;
use crate::utils::args::SpecArg;

/// Default Invenio repository.
pub const INVENIO_REPO_URL: &str = "http://invenio-software.org/repo/invenio/";

/// Longest instance (and MySQL user) name.
pub const MAX_NAME_LEN: usize = 16;

// ============================================================================
// Roles
// ============================================================================

/// Host groups tasks are targeted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Web,
    #[serde(alias = "db-master", alias = "db-slave")]
    Db,
    Backend,
    Workers,
    Lb,
    Cache,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Web => "web",
            Role::Db => "db",
            Role::Backend => "backend",
            Role::Workers => "workers",
            Role::Lb => "lb",
            Role::Cache => "cache",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Environment model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Registry key (`loc`, `prod`, ...).
    #[serde(default)]
    pub name: String,

    /// Instance name; derived from the site name, python and ref when empty.
    #[serde(default)]
    pub instance: String,

    #[serde(default)]
    pub roledefs: BTreeMap<Role, Vec<String>>,

    /// SSH login user.
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub ssh_port: Option<u16>,

    #[serde(default)]
    pub identity_file: Option<String>,

    /// Interpreter used to create the virtualenv.
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_true")]
    pub with_virtualenv: bool,
    #[serde(default = "default_true")]
    pub with_devserver: bool,
    #[serde(default = "default_true")]
    pub with_workdir: bool,
    #[serde(default = "default_true")]
    pub with_devscripts: bool,

    /// Installation prefix (`CFG_INVENIO_PREFIX`).
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub srcdir: String,
    #[serde(default)]
    pub srcworkdir: String,

    /// Template rendered into `invenio-local.conf`.
    #[serde(default = "default_conf")]
    pub conf: String,

    /// User owning the installation (`CFG_INVENIO_USER`).
    #[serde(default)]
    pub invenio_user: String,

    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub domainname: String,
    #[serde(default = "default_port")]
    pub port_http: u16,
    #[serde(default = "default_port")]
    pub port_https: u16,
    #[serde(default = "default_apachectl")]
    pub apachectl: String,
    #[serde(default = "default_admin")]
    pub admin: String,

    #[serde(default)]
    pub database: Database,

    #[serde(default = "default_repos")]
    pub repos: Vec<Repo>,

    /// Extra requirement files (templates) installed by `venv_requirements`.
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Task groups: group name → task invocations.
    #[serde(default = "default_task_groups")]
    pub tasks: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub settings: Settings,

    /// Free-form template variables; override the generated ones.
    #[serde(default = "default_vars")]
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_hostname")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Defaults to the instance name.
    #[serde(default)]
    pub name: String,
    /// Defaults to the instance name cut to 16 characters.
    #[serde(default)]
    pub user: String,
    /// Prompted for when unset.
    #[serde(default)]
    pub password: Option<String>,
    /// Defaults to the installation prefix.
    #[serde(default)]
    pub dumpdir: String,
    #[serde(default)]
    pub drop_allowed: bool,
    /// MySQL root password; `mysql` prompts interactively when unset.
    #[serde(default)]
    pub root_password: Option<String>,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            host: default_hostname(),
            port: default_db_port(),
            name: String::new(),
            user: String::new(),
            password: None,
            dumpdir: String::new(),
            drop_allowed: false,
            root_password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default = "default_bootstrap_targets")]
    pub bootstrap_targets: Vec<String>,
    #[serde(default = "default_deploy_targets")]
    pub deploy_targets: Vec<String>,
    #[serde(default = "default_install_targets")]
    pub install_targets: Vec<String>,
    /// Requirement files relative to the repository checkout.
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default, deserialize_with = "hook_or_disabled")]
    pub configure_hook: Hook,
    #[serde(default, deserialize_with = "hook_or_disabled")]
    pub prepare_hook: Hook,
}

impl Repo {
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            git_ref: None,
            bootstrap_targets: default_bootstrap_targets(),
            deploy_targets: default_deploy_targets(),
            install_targets: default_install_targets(),
            requirements: Vec::new(),
            configure_hook: Hook::Default,
            prepare_hook: Hook::Default,
        }
    }

    /// Make targets stored under `key` (`bootstrap_targets`, `deploy_targets`
    /// or `install_targets`).
    pub fn targets(&self, key: &str) -> Option<&[String]> {
        match key {
            "bootstrap_targets" | "bootstrap" => Some(&self.bootstrap_targets),
            "deploy_targets" | "deploy" => Some(&self.deploy_targets),
            "install_targets" | "install" | "targets" => Some(&self.install_targets),
            _ => None,
        }
    }
}

/// Per-ref substitutions for a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_targets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_targets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_targets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
}

/// How a repository is configured or prepared after checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hook {
    /// Built-in autotools behavior.
    #[default]
    Default,
    /// Do nothing.
    None,
    /// Render `template` to `destination` (both may use `{{topsrcdir}}`).
    Template {
        template: String,
        destination: String,
    },
    /// Run each command as the application user.
    Commands { commands: Vec<String> },
}

fn hook_or_disabled<'de, D>(deserializer: D) -> std::result::Result<Hook, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Hook>::deserialize(deserializer)?.unwrap_or(Hook::None))
}

/// Per-module settings (`env settings <module>`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bibsched: BibschedSettings,
    #[serde(default)]
    pub system: SystemSettings,
    #[serde(default)]
    pub invenio: InvenioSettings,
    #[serde(default)]
    pub haproxy: HaproxySettings,
    #[serde(default)]
    pub redis: RedisSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibschedSettings {
    #[serde(default = "default_schedule")]
    pub schedule: Vec<String>,
}

impl Default for BibschedSettings {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Local crontab file (relative to the site directory) or template name.
    #[serde(default)]
    pub crontab: Option<String>,
    /// Files copied by `copy_files`.
    #[serde(default)]
    pub copy: Vec<CopySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopySpec {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvenioSettings {
    /// Plain config file uploaded instead of rendering the `conf` template.
    #[serde(default)]
    pub conffile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaproxySettings {
    /// Server name → HAProxy `backend/server` identifiers.
    #[serde(default)]
    pub backends: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: Option<u32>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_python() -> String {
    "python".to_string()
}

fn default_conf() -> String {
    "invenio-local.conf".to_string()
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_db_port() -> u16 {
    3306
}

fn default_apachectl() -> String {
    "/etc/init.d/httpd".to_string()
}

fn default_admin() -> String {
    "nobody@localhost".to_string()
}

fn default_bootstrap_targets() -> Vec<String> {
    to_strings(&[
        "all",
        "install",
        "install-mathjax-plugin",
        "install-ckeditor-plugin",
        "install-pdfa-helper-files",
        "install-jquery-plugins",
    ])
}

fn default_deploy_targets() -> Vec<String> {
    to_strings(&["all", "check-upgrade", "install"])
}

fn default_install_targets() -> Vec<String> {
    to_strings(&["all", "install"])
}

fn default_repos() -> Vec<Repo> {
    let mut invenio = Repo::new("invenio", INVENIO_REPO_URL);
    invenio.git_ref = Some("master".to_string());
    invenio.requirements = to_strings(&["requirements.txt", "requirements-extra.txt"]);
    vec![invenio]
}

fn default_task_groups() -> BTreeMap<String, Vec<String>> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "prepare".to_string(),
        to_strings(&[
            "python_prepare",
            "selinux_prepare",
            "mysql_prepare",
            "mysql_createdb",
            "apache_prepare",
            "apache_configure",
        ]),
    );
    groups.insert(
        "deploy".to_string(),
        to_strings(&[
            "repo_update",
            "repo_install:targets_key=deploy_targets",
            "invenio_conf",
            "invenio_upgrade",
            "apache_restart",
        ]),
    );
    groups.insert(
        "clean".to_string(),
        to_strings(&[
            "python_clean",
            "apache_clean",
            "apache_restart",
            "mysql_dropdb",
            "invenio_clean",
        ]),
    );
    groups
}

fn default_schedule() -> Vec<String> {
    to_strings(&[
        "bibindex -f50000 -s5m -u admin",
        "bibrank -f50000 -s5m -u admin",
        "bibreformat -oHB -s5m -u admin",
        "webcoll -v0 -s5m -u admin",
        "bibsort -s5m -u admin",
        "bibrank -f50000 -R -wwrd -s14d -LSunday -u admin",
        "bibsort -R -s7d -L 'Sunday 01:00-05:00' -u admin",
        "inveniogc -a -s7d -L 'Sunday 01:00-05:00' -u admin",
        "batchuploader --documents -s20m -u admin",
        "batchuploader --metadata -s20m -u admin",
        "dbdump -s 20h -L '22:00-06:00' -n 10 -u admin",
        "oairepositoryupdater -s1h -u admin",
        "oaiharvest -s 24h  -u admin",
    ])
}

fn default_vars() -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("CFG_MISCUTIL_SMTP_HOST".to_string(), "127.0.0.1".to_string());
    vars.insert("CFG_MISCUTIL_SMTP_PORT".to_string(), "1025".to_string());
    vars
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "invenio".to_string())
}

// ============================================================================
// Environment operations
// ============================================================================

/// Parameters accepted when creating an environment (`-e loc:py=2.7,ref=...`).
#[derive(Debug, Clone, Default)]
pub struct EnvParams {
    /// Python version key looked up in the site's python table.
    pub python: Option<String>,
    /// Ref for the primary repository.
    pub git_ref: Option<String>,
    /// Repository name → ref.
    pub repo_refs: Vec<(String, String)>,
    /// SSH user (`-u`).
    pub user: Option<String>,
    /// Dotted `--set` overrides.
    pub overrides: Vec<(String, String)>,
}

impl EnvParams {
    /// Build from task-spec style arguments: `py=`, `ref=`, `<repo>=<ref>`.
    pub fn from_spec_args(args: &[SpecArg]) -> Result<Self> {
        let mut params = EnvParams::default();
        for arg in args {
            match arg {
                SpecArg::Keyword(key, value) => match key.as_str() {
                    "py" | "python" => params.python = Some(value.clone()),
                    "ref" => params.git_ref = Some(value.clone()),
                    "user" => params.user = Some(value.clone()),
                    _ => params.repo_refs.push((key.clone(), value.clone())),
                },
                SpecArg::Positional(value) => {
                    return Err(Error::validation_invalid_argument(
                        "environment",
                        "Environment parameters must be key=value pairs",
                        Some(value.clone()),
                        Some(vec!["py".to_string(), "ref".to_string()]),
                    ))
                }
            }
        }
        Ok(params)
    }
}

impl Environment {
    /// Built-in defaults for an environment. Fields derived from the
    /// instance name are left empty until [`Environment::resolve`].
    fn base(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instance: String::new(),
            roledefs: BTreeMap::new(),
            user: current_user(),
            ssh_port: None,
            identity_file: None,
            python: default_python(),
            with_virtualenv: true,
            with_devserver: true,
            with_workdir: true,
            with_devscripts: true,
            prefix: String::new(),
            srcdir: String::new(),
            srcworkdir: String::new(),
            conf: default_conf(),
            invenio_user: String::new(),
            hostname: default_hostname(),
            domainname: String::new(),
            port_http: default_port(),
            port_https: default_port(),
            apachectl: default_apachectl(),
            admin: default_admin(),
            database: Database::default(),
            repos: default_repos(),
            requirements: Vec::new(),
            tasks: default_task_groups(),
            settings: Settings::default(),
            vars: default_vars(),
        }
    }

    /// Fill every empty derived field from the instance name.
    fn resolve(&mut self, fallback_instance: &str) {
        if self.instance.is_empty() {
            self.instance = fallback_instance.to_string();
        }
        if self.user.is_empty() {
            self.user = current_user();
        }
        if self.prefix.is_empty() {
            self.prefix = format!("{}/{}", paths::workon_home(), self.instance);
        } else {
            self.prefix = shellexpand::tilde(&self.prefix).to_string();
        }
        if self.srcdir.is_empty() {
            self.srcdir = format!("{}/src", self.prefix);
        } else {
            self.srcdir = shellexpand::tilde(&self.srcdir).to_string();
        }
        if self.srcworkdir.is_empty() {
            self.srcworkdir = self.srcdir.clone();
        } else {
            self.srcworkdir = shellexpand::tilde(&self.srcworkdir).to_string();
        }
        if self.invenio_user.is_empty() {
            self.invenio_user = self.user.clone();
        }
        if self.database.name.is_empty() {
            self.database.name = self.instance.clone();
        }
        if self.database.user.is_empty() {
            self.database.user = self.instance.chars().take(MAX_NAME_LEN).collect();
        }
        if self.database.dumpdir.is_empty() {
            self.database.dumpdir = self.prefix.clone();
        }
    }

    /// Hosts for a role (empty when the role is not defined).
    pub fn hosts(&self, role: Role) -> &[String] {
        self.roledefs.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn repo(&self, name: &str) -> Option<&Repo> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn repo_names(&self) -> Vec<String> {
        self.repos.iter().map(|r| r.name.clone()).collect()
    }

    /// Settings block of one module as JSON.
    pub fn settings(&self, module: &str) -> Result<Value> {
        let value = match module {
            "bibsched" => serde_json::to_value(&self.settings.bibsched),
            "mysql" | "database" => serde_json::to_value(&self.database),
            "system" => serde_json::to_value(&self.settings.system),
            "invenio" => serde_json::to_value(&self.settings.invenio),
            "haproxy" => serde_json::to_value(&self.settings.haproxy),
            "redis" => serde_json::to_value(&self.settings.redis),
            "tasks" => serde_json::to_value(&self.tasks),
            _ => {
                return Err(Error::config_missing_key(
                    format!("settings.{}", module),
                    Some(self.name.clone()),
                )
                .with_hint(
                    "Known modules: bibsched, mysql, system, invenio, haproxy, redis, tasks",
                ))
            }
        };
        value.map_err(|e| Error::internal_json(e.to_string(), Some("serialize settings".into())))
    }

    /// Template variables describing this environment.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut set = |k: &str, v: String| {
            vars.insert(k.to_string(), v);
        };
        let flag = |b: bool| if b { "True" } else { "False" }.to_string();

        set("env", self.name.clone());
        set("instance", self.instance.clone());
        set("user", self.user.clone());
        set("PYTHON", self.python.clone());
        set("WITH_VIRTUALENV", flag(self.with_virtualenv));
        set("WITH_DEVSERVER", flag(self.with_devserver));
        set("WITH_WORKDIR", flag(self.with_workdir));
        set("WITH_DEVSCRIPTS", flag(self.with_devscripts));
        set("ACTIVATE", format!(". {}/bin/activate", self.prefix));
        set("CFG_INVENIO_PREFIX", self.prefix.clone());
        set("CFG_SRCDIR", self.srcdir.clone());
        set("CFG_SRCWORKDIR", self.srcworkdir.clone());
        set("CFG_INVENIO_CONF", self.conf.clone());
        set("CFG_INVENIO_USER", self.invenio_user.clone());
        set("CFG_INVENIO_HOSTNAME", self.hostname.clone());
        set("CFG_INVENIO_DOMAINNAME", self.domainname.clone());
        set("CFG_INVENIO_PORT_HTTP", self.port_http.to_string());
        set("CFG_INVENIO_PORT_HTTPS", self.port_https.to_string());
        set("CFG_INVENIO_APACHECTL", self.apachectl.clone());
        set("CFG_INVENIO_ADMIN", self.admin.clone());
        set("CFG_DATABASE_HOST", self.database.host.clone());
        set("CFG_DATABASE_PORT", self.database.port.to_string());
        set("CFG_DATABASE_NAME", self.database.name.clone());
        set("CFG_DATABASE_USER", self.database.user.clone());
        set(
            "CFG_DATABASE_PASS",
            self.database.password.clone().unwrap_or_default(),
        );
        set("CFG_DATABASE_DUMPDIR", self.database.dumpdir.clone());
        if let Some(password) = &self.settings.redis.password {
            set("CFG_REDIS_PASSWORD", password.clone());
        }
        if let Some(db) = self.settings.redis.db {
            set("CFG_REDIS_DB", db.to_string());
        }

        for repo in &self.repos {
            let key = format!(
                "CFG_{}_SRCDIR",
                repo.name.to_uppercase().replace(['-', '.'], "_")
            );
            set(&key, self.repo_path(&repo.name, true));
        }

        for (k, v) in &self.vars {
            set(k, v.clone());
        }

        vars
    }

    /// Checkout path of a repository (work directory when enabled).
    pub fn repo_path(&self, repo: &str, workdir: bool) -> String {
        let root = if workdir && self.with_workdir {
            &self.srcworkdir
        } else {
            &self.srcdir
        };
        format!("{}/{}", root.trim_end_matches('/'), repo)
    }
}

/// Default settings for an environment, with derived fields resolved.
pub fn defaults(name: &str, instance: &str) -> Environment {
    let mut env = Environment::base(name);
    env.resolve(instance);
    env
}

/// Build an environment from the defaults, the site definition and the
/// command-line parameters.
pub fn create(site: &Site, name: &str, params: &EnvParams) -> Result<Environment> {
    let patch = site.environments.get(name).cloned().ok_or_else(|| {
        Error::environment_not_found(
            name.to_string(),
            crate::utils::suggest::find_similar(name, site.environments.keys()),
        )
    })?;

    let python = match &params.python {
        Some(version) => Some(site.python(version)?),
        None => None,
    };

    let mut base = serde_json::to_value(Environment::base(name))
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize defaults".into())))?;
    config::deep_merge(&mut base, patch);

    if let Some(user) = &params.user {
        config::set_dotted(&mut base, "user", Value::String(user.clone()))?;
    }
    for (key, raw) in &params.overrides {
        let value = config::parse_value_at(&base, key, raw);
        config::set_dotted(&mut base, key, value)?;
    }

    let mut env: Environment = serde_json::from_value(base).map_err(|e| {
        Error::config_invalid_value(
            format!("environments.{}", name),
            None,
            format!("Invalid environment definition: {}", e),
        )
    })?;
    env.name = name.to_string();

    if let Some(python) = python {
        env.python = python;
    }

    let fallback = make_name(
        &site.name,
        params.python.as_deref().unwrap_or(""),
        params.git_ref.as_deref().unwrap_or(""),
    );
    env.resolve(&fallback);

    if let Some(git_ref) = &params.git_ref {
        let primary = site
            .primary_repo
            .clone()
            .or_else(|| env.repos.first().map(|r| r.name.clone()))
            .ok_or_else(|| Error::repo_not_found("(primary)", Vec::new()))?;
        override_repo(&mut env, &primary, git_ref, &site.refs)?;
    }
    for (repo, git_ref) in &params.repo_refs {
        override_repo(&mut env, repo, git_ref, &site.refs)?;
    }

    Ok(env)
}

/// Point `repo` at `git_ref`, substituting targets and requirements when
/// `overrides` has an entry for that ref.
pub fn override_repo(
    env: &mut Environment,
    repo: &str,
    git_ref: &str,
    overrides: &BTreeMap<String, RepoOverride>,
) -> Result<()> {
    let known = env.repo_names();
    let entry = env
        .repos
        .iter_mut()
        .find(|r| r.name == repo)
        .ok_or_else(|| Error::repo_not_found(repo, known))?;

    entry.git_ref = Some(git_ref.to_string());

    if let Some(ov) = overrides.get(git_ref) {
        if let Some(targets) = &ov.bootstrap_targets {
            entry.bootstrap_targets = targets.clone();
        }
        if let Some(targets) = &ov.deploy_targets {
            entry.deploy_targets = targets.clone();
        }
        if let Some(targets) = &ov.install_targets {
            entry.install_targets = targets.clone();
        }
        if let Some(requirements) = &ov.requirements {
            entry.requirements = requirements.clone();
        }
    }

    Ok(())
}

/// Instance name from a prefix, python version and git ref:
/// `("atlantis", "2.7", "origin/maint-1.1")` → `atlantis27maint1`.
pub fn make_name(prefix: &str, python: &str, git_ref: &str) -> String {
    let git_ref = git_ref.rsplit('/').next().unwrap_or("").replace('-', "_");
    let python = python.replace('.', "");

    let name = format!("{}{}{}", prefix, python, git_ref);
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        let squeezed = name.replacen('_', "", len - MAX_NAME_LEN);
        return squeezed.chars().take(MAX_NAME_LEN).collect();
    }
    name
}

// ============================================================================
// Registry
// ============================================================================

/// Defined environments plus the default (being edited) and active ones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    environments: BTreeMap<String, Environment>,
    default: Option<String>,
    active: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every environment of the site; `selected` gets `params` and
    /// becomes default and active.
    pub fn from_site(site: &Site, selected: &str, params: &EnvParams) -> Result<Self> {
        let mut registry = Registry::new();
        let env = create(site, selected, params)?;
        registry.insert(env, true);

        for name in site.environments.keys() {
            if name != selected {
                let env = create(site, name, &EnvParams::default())?;
                registry.insert(env, false);
            }
        }

        registry.set_default(selected)?;
        Ok(registry)
    }

    /// Register an environment, making it the default and optionally active.
    pub fn insert(&mut self, env: Environment, activate: bool) {
        let name = env.name.clone();
        self.environments.insert(name.clone(), env);
        self.default = Some(name.clone());
        if activate {
            self.active = Some(name);
        }
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        self.ensure_defined(name)?;
        self.default = Some(name.to_string());
        Ok(())
    }

    /// Environment currently being edited.
    pub fn default_env(&self) -> Result<&Environment> {
        let name = self
            .default
            .as_deref()
            .ok_or_else(|| Error::task_aborted("No default environment set."))?;
        self.get(name)
    }

    pub fn activate(&mut self, name: &str) -> Result<()> {
        self.ensure_defined(name)?;
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn active(&self) -> Result<&Environment> {
        let name = self.active.as_deref().ok_or_else(|| {
            Error::task_aborted("No active environment.")
                .with_hint("Select one with -e <environment>")
        })?;
        self.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| self.not_found(name))
    }

    /// Settings of a module for the active environment or a named one.
    pub fn settings(&self, module: &str, env_name: Option<&str>) -> Result<Value> {
        match env_name {
            Some(name) => self.get(name)?.settings(module),
            None => self.active()?.settings(module),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    fn ensure_defined(&self, name: &str) -> Result<()> {
        if self.environments.contains_key(name) {
            Ok(())
        } else {
            Err(self.not_found(name))
        }
    }

    fn not_found(&self, name: &str) -> Error {
        Error::environment_not_found(
            name.to_string(),
            crate::utils::suggest::find_similar(name, self.environments.keys()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn site(environments: Value) -> Site {
        let raw = json!({
            "name": "atlantis",
            "pythons": {"2.7": "/opt/python2.7/bin/python", "2.4": "/opt/python2.4/bin/python"},
            "refs": {
                "origin/maint-1.1": {
                    "bootstrap_targets": ["all", "install"],
                    "deploy_targets": ["all", "install"]
                }
            },
            "environments": environments,
        });
        let mut site: Site = serde_json::from_value(raw).unwrap();
        site.path = PathBuf::from("/srv/atlantis/invenio-deploy.json");
        site
    }

    #[test]
    fn make_name_examples() {
        assert_eq!(make_name("atlantis", "2.7", "origin/maint-1.1"), "atlantis27maint1");
        assert_eq!(make_name("atlantis", "", ""), "atlantis");
        assert_eq!(make_name("atlantis", "2.4", "master"), "atlantis24master");
        assert_eq!(make_name("inspireprod", "2.6", "next"), "inspireprod26nex");
        assert_eq!(
            make_name("inspireprod", "2.7", "origin/prod-branch_x"),
            "inspireprod27pro"
        );
    }

    #[test]
    fn make_name_squeezes_underscores_before_truncating() {
        // 18 characters: the first two underscores go, the rest stays.
        assert_eq!(make_name("inspire", "2.7", "a_b_c_d_e"), "inspire27abc_d_e");
        assert_eq!(make_name("inspire", "", "origin/x_y"), "inspirex_y");
    }

    #[test]
    fn defaults_derive_from_instance() {
        let env = defaults("loc", "atlantis27maint1");
        assert!(env.prefix.ends_with("/atlantis27maint1"));
        assert_eq!(env.srcdir, format!("{}/src", env.prefix));
        assert_eq!(env.srcworkdir, env.srcdir);
        assert_eq!(env.database.name, "atlantis27maint1");
        assert_eq!(env.database.user, "atlantis27maint1");
        assert_eq!(env.database.dumpdir, env.prefix);
        assert_eq!(env.database.password, None);
        assert!(!env.database.drop_allowed);
        assert_eq!(env.port_http, 4000);
        assert_eq!(env.invenio_user, env.user);
        assert_eq!(env.repos[0].name, "invenio");
        assert_eq!(env.repos[0].git_ref.as_deref(), Some("master"));
        assert_eq!(env.settings.bibsched.schedule.len(), 13);
    }

    #[test]
    fn database_user_is_truncated() {
        let env = defaults("loc", "averyveryverylonginstancename");
        assert_eq!(env.database.user, "averyveryverylon");
        assert_eq!(env.database.name, "averyveryverylonginstancename");
    }

    #[test]
    fn create_merges_site_definition() {
        let site = site(json!({
            "loc": {
                "prefix": "/opt/invenio",
                "roledefs": {"web": ["localhost"], "db-master": ["db1"]},
                "database": {"password": "secret"},
                "settings": {"redis": {"db": 3}},
                "requirements": ["{{CFG_INVENIO_SRCDIR}}/requirements-flask.txt"]
            }
        }));

        let env = create(&site, "loc", &EnvParams::default()).unwrap();
        assert_eq!(env.instance, "atlantis");
        assert_eq!(env.prefix, "/opt/invenio");
        assert_eq!(env.srcdir, "/opt/invenio/src");
        assert_eq!(env.hosts(Role::Db), &["db1".to_string()]);
        assert_eq!(env.database.password.as_deref(), Some("secret"));
        assert_eq!(env.database.host, "localhost");
        assert_eq!(env.settings.redis.db, Some(3));
        assert_eq!(env.settings.bibsched.schedule.len(), 13);
        assert_eq!(env.requirements.len(), 1);
    }

    #[test]
    fn create_applies_python_ref_and_overrides() {
        let site = site(json!({"loc": {}}));
        let params = EnvParams {
            python: Some("2.7".to_string()),
            git_ref: Some("origin/maint-1.1".to_string()),
            overrides: vec![("database.port".to_string(), "3307".to_string())],
            ..EnvParams::default()
        };

        let env = create(&site, "loc", &params).unwrap();
        assert_eq!(env.python, "/opt/python2.7/bin/python");
        assert_eq!(env.instance, "atlantis27maint1");
        assert_eq!(env.database.port, 3307);

        let invenio = env.repo("invenio").unwrap();
        assert_eq!(invenio.git_ref.as_deref(), Some("origin/maint-1.1"));
        assert_eq!(invenio.bootstrap_targets, vec!["all", "install"]);
        assert_eq!(invenio.install_targets, vec!["all", "install"]);
    }

    #[test]
    fn numeric_looking_overrides_stay_strings() {
        let site = site(json!({"loc": {}}));
        let params = EnvParams {
            overrides: vec![
                ("vars.CFG_MISCUTIL_SMTP_PORT".to_string(), "25".to_string()),
                ("database.password".to_string(), "123456".to_string()),
                ("database.drop_allowed".to_string(), "true".to_string()),
            ],
            ..EnvParams::default()
        };

        let registry = Registry::from_site(&site, "loc", &params).unwrap();
        let env = registry.get("loc").unwrap();
        assert_eq!(env.vars["CFG_MISCUTIL_SMTP_PORT"], "25");
        assert_eq!(env.database.password.as_deref(), Some("123456"));
        assert!(env.database.drop_allowed);
    }

    #[test]
    fn create_rejects_unknown_python_and_env() {
        let site = site(json!({"loc": {}}));
        let params = EnvParams {
            python: Some("3.9".to_string()),
            ..EnvParams::default()
        };
        let err = create(&site, "loc", &params).unwrap_err();
        assert_eq!(err.message, "Unknown Python version 3.9");

        let err = create(&site, "lco", &EnvParams::default()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::EnvironmentNotFound);
        assert_eq!(err.details["suggestions"][0], "loc");
    }

    #[test]
    fn named_repo_refs_apply_to_that_repo() {
        let site = site(json!({
            "loc": {
                "repos": [
                    {"name": "invenio", "repository": "http://example.org/invenio.git", "ref": "master"},
                    {"name": "inspire", "repository": "http://example.org/inspire.git",
                     "prepare_hook": null,
                     "configure_hook": {"kind": "template", "template": "config-local.mk",
                                        "destination": "{{topsrcdir}}/config-local.mk"}}
                ]
            }
        }));
        let params = EnvParams {
            repo_refs: vec![("inspire".to_string(), "next".to_string())],
            ..EnvParams::default()
        };
        let env = create(&site, "loc", &params).unwrap();
        let inspire = env.repo("inspire").unwrap();
        assert_eq!(inspire.git_ref.as_deref(), Some("next"));
        assert_eq!(inspire.prepare_hook, Hook::None);
        assert!(matches!(inspire.configure_hook, Hook::Template { .. }));
        assert_eq!(env.repo("invenio").unwrap().git_ref.as_deref(), Some("master"));

        let bad = EnvParams {
            repo_refs: vec![("nope".to_string(), "x".to_string())],
            ..EnvParams::default()
        };
        let err = create(&site, "loc", &bad).unwrap_err();
        assert_eq!(err.message, "nope is not a valid repository.");
    }

    #[test]
    fn override_repo_without_entry_only_sets_ref() {
        let mut env = defaults("loc", "atlantis");
        override_repo(&mut env, "invenio", "maint-1.1", &BTreeMap::new()).unwrap();
        let repo = env.repo("invenio").unwrap();
        assert_eq!(repo.git_ref.as_deref(), Some("maint-1.1"));
        assert_eq!(repo.deploy_targets, vec!["all", "check-upgrade", "install"]);
    }

    #[test]
    fn settings_by_module() {
        let env = defaults("loc", "atlantis");
        assert_eq!(env.settings("mysql").unwrap()["name"], "atlantis");
        assert!(env.settings("tasks").unwrap()["clean"].is_array());
        let err = env.settings("unknown").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigMissingKey);
    }

    #[test]
    fn template_vars_include_repo_srcdirs() {
        let mut env = defaults("loc", "atlantis");
        env.prefix = "/opt/atlantis".to_string();
        env.srcdir = "/opt/atlantis/src".to_string();
        env.srcworkdir = "/opt/atlantis/src".to_string();
        let vars = env.template_vars();
        assert_eq!(vars["CFG_INVENIO_SRCDIR"], "/opt/atlantis/src/invenio");
        assert_eq!(vars["CFG_INVENIO_PREFIX"], "/opt/atlantis");
        assert_eq!(vars["WITH_WORKDIR"], "True");
        assert_eq!(vars["CFG_MISCUTIL_SMTP_PORT"], "1025");
    }

    #[test]
    fn registry_tracks_default_and_active() {
        let site = site(json!({"loc": {}, "prod": {"instance": "atlantis"}}));
        let mut registry = Registry::from_site(&site, "loc", &EnvParams::default()).unwrap();
        assert_eq!(registry.active_name(), Some("loc"));
        assert_eq!(registry.default_name(), Some("loc"));
        assert_eq!(registry.names(), vec!["loc", "prod"]);

        registry.set_default("prod").unwrap();
        assert_eq!(registry.default_env().unwrap().instance, "atlantis");
        assert_eq!(registry.active().unwrap().name, "loc");

        registry.activate("prod").unwrap();
        assert_eq!(registry.settings("redis", None).unwrap()["db"], Value::Null);
        assert!(registry.activate("staging").is_err());
    }
}
