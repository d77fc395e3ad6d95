use serde::{Deserialize, Serialize};
use std::fs;

use crate::paths;

/// Root configuration structure for config.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_ssh")]
    pub ssh: SshConfig,

    #[serde(default = "default_services")]
    pub services: ServicesConfig,

    #[serde(default = "default_mysql")]
    pub mysql: MysqlConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            ssh: default_ssh(),
            services: default_services(),
            mysql: default_mysql(),
        }
    }
}

/// Connection options passed to every `ssh` invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u32,

    #[serde(default = "default_server_alive_interval")]
    pub server_alive_interval: u32,

    #[serde(default = "default_server_alive_count_max")]
    pub server_alive_count_max: u32,

    /// Attempts per command when the connection itself fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_ssh_port")]
    pub default_port: u16,
}

/// Paths of system service tooling on target hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_service_bin")]
    pub service: String,

    #[serde(default = "default_chkconfig_bin")]
    pub chkconfig: String,

    #[serde(default = "default_init_d")]
    pub init_d: String,

    #[serde(default = "default_httpd_conf")]
    pub httpd_conf: String,

    #[serde(default = "default_haproxy_conf")]
    pub haproxy_conf: String,

    #[serde(default = "default_haproxy_stats_socket")]
    pub haproxy_stats_socket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    #[serde(default = "default_charset")]
    pub charset: String,

    #[serde(default = "default_collation")]
    pub collation: String,

    /// Offered when the operator leaves the password prompt empty.
    #[serde(default = "default_password")]
    pub default_password: String,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_ssh() -> SshConfig {
    SshConfig {
        connect_timeout: default_connect_timeout(),
        server_alive_interval: default_server_alive_interval(),
        server_alive_count_max: default_server_alive_count_max(),
        max_attempts: default_max_attempts(),
        default_port: default_ssh_port(),
    }
}

fn default_connect_timeout() -> u32 {
    10
}

fn default_server_alive_interval() -> u32 {
    15
}

fn default_server_alive_count_max() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_ssh_port() -> u16 {
    22
}

fn default_services() -> ServicesConfig {
    ServicesConfig {
        service: default_service_bin(),
        chkconfig: default_chkconfig_bin(),
        init_d: default_init_d(),
        httpd_conf: default_httpd_conf(),
        haproxy_conf: default_haproxy_conf(),
        haproxy_stats_socket: default_haproxy_stats_socket(),
    }
}

fn default_service_bin() -> String {
    "/sbin/service".to_string()
}

fn default_chkconfig_bin() -> String {
    "/sbin/chkconfig".to_string()
}

fn default_init_d() -> String {
    "/etc/init.d".to_string()
}

fn default_httpd_conf() -> String {
    "/etc/httpd/conf/httpd.conf".to_string()
}

fn default_haproxy_conf() -> String {
    "/etc/haproxy/haproxy.cfg".to_string()
}

fn default_haproxy_stats_socket() -> String {
    "/var/lib/haproxy/stats".to_string()
}

fn default_mysql() -> MysqlConfig {
    MysqlConfig {
        charset: default_charset(),
        collation: default_collation(),
        default_password: default_password(),
    }
}

fn default_charset() -> String {
    "utf8".to_string()
}

fn default_collation() -> String {
    "utf8_general_ci".to_string()
}

fn default_password() -> String {
    "my123p$ss".to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If config.json is missing or invalid, returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full config.json, falling back to defaults on any error.
pub fn load_config() -> GlobalConfig {
    match load_config_from_file() {
        Ok(Some(config)) => config,
        Ok(None) => GlobalConfig::default(),
        Err(err) => {
            log_status!("warn", "Ignoring config.json: {}", err.message);
            GlobalConfig::default()
        }
    }
}

fn load_config_from_file() -> crate::Result<Option<GlobalConfig>> {
    let path = paths::config_json()?;

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let config: GlobalConfig = serde_json::from_str(&content).map_err(|e| {
        crate::Error::config_parse_failed(path.display().to_string(), "json", e.to_string())
    })?;

    Ok(Some(config))
}

/// Get the path to config.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::config_json()?.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_builtin_defaults() {
        let config: GlobalConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.defaults.ssh.connect_timeout, 10);
        assert_eq!(config.defaults.services.httpd_conf, "/etc/httpd/conf/httpd.conf");
        assert_eq!(config.defaults.mysql.default_password, "my123p$ss");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: GlobalConfig =
            serde_json::from_str(r#"{"defaults":{"ssh":{"max_attempts":1}}}"#).unwrap();
        assert_eq!(config.defaults.ssh.max_attempts, 1);
        assert_eq!(config.defaults.ssh.server_alive_interval, 15);
        assert_eq!(config.defaults.services.init_d, "/etc/init.d");
    }
}
