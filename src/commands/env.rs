use clap::{Args, Subcommand};
use serde::Serialize;

use invenio_deploy::defaults;
use invenio_deploy::Environment;

use super::{CmdResult, GlobalArgs, Workspace};

#[derive(Args)]
pub struct EnvArgs {
    #[command(subcommand)]
    command: EnvCommand,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// List the site's environments
    List,
    /// Display a fully merged environment
    Show {
        /// Environment name (default: the selected one)
        name: Option<String>,
    },
    /// Display one module's settings (mysql, bibsched, haproxy, redis, system, invenio, tasks)
    Settings {
        module: String,
        /// Environment name (default: the selected one)
        name: Option<String>,
    },
}

#[derive(Default, Serialize)]
pub struct EnvOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    environments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<Environment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<serde_json::Value>,
}

pub fn run(args: EnvArgs, global: &GlobalArgs) -> CmdResult<EnvOutput> {
    let workspace = Workspace::load(global)?;
    let registry = &workspace.registry;

    let output = match args.command {
        EnvCommand::List => EnvOutput {
            command: "env.list".to_string(),
            environments: Some(registry.names()),
            active: registry.active_name().map(str::to_string),
            site_file: Some(workspace.site.path.display().to_string()),
            config_file: defaults::config_path().ok(),
            ..Default::default()
        },
        EnvCommand::Show { name } => {
            let env = match &name {
                Some(name) => registry.get(name)?,
                None => registry.default_env()?,
            };
            EnvOutput {
                command: "env.show".to_string(),
                environment: Some(env.clone()),
                ..Default::default()
            }
        }
        EnvCommand::Settings { module, name } => EnvOutput {
            command: "env.settings".to_string(),
            settings: Some(registry.settings(&module, name.as_deref())?),
            module: Some(module),
            ..Default::default()
        },
    };

    Ok((output, 0))
}
