use clap::Args;
use std::path::PathBuf;

use invenio_deploy::console::{AssumeYes, Console, NoConsole};
use invenio_deploy::defaults::{self, Defaults};
use invenio_deploy::env::{EnvParams, Registry};
use invenio_deploy::executor::{RecordingRunner, Runner, SystemRunner};
use invenio_deploy::utils::args::{split_assignment, split_spec};
use invenio_deploy::{Error, Site};

pub type CmdResult<T> = invenio_deploy::Result<(T, i32)>;

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Site definition file (default: invenio-deploy.{json,toml,yaml} in the current directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub site: Option<PathBuf>,

    /// Environment, optionally with parameters: loc:py=2.7,ref=maint-1.1,inspire=prod
    #[arg(short = 'e', long = "env", global = true, value_name = "ENV")]
    pub env: Option<String>,

    /// SSH user
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Override an environment setting (dotted key): --set database.drop_allowed=true
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Answer yes to every confirmation and accept prompt defaults
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Print the commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Site, environments and execution backends for one invocation.
pub struct Workspace {
    pub site: Site,
    pub registry: Registry,
    pub defaults: Defaults,
}

impl Workspace {
    pub fn load(global: &GlobalArgs) -> invenio_deploy::Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::internal_io(e.to_string(), Some("current dir".to_string())))?;
        let site = Site::discover(global.site.as_deref(), &cwd)?;

        let (name, mut params) = match &global.env {
            Some(spec) => {
                let (name, args) = split_spec(spec);
                (name, EnvParams::from_spec_args(&args)?)
            }
            None => (default_environment(&site)?, EnvParams::default()),
        };

        if let Some(user) = &global.user {
            params.user = Some(user.clone());
        }
        for raw in &global.set {
            let (key, value) = split_assignment(raw).ok_or_else(|| {
                Error::validation_invalid_argument(
                    "set",
                    "Expected KEY=VALUE",
                    Some(raw.clone()),
                    None,
                )
            })?;
            params.overrides.push((key, value));
        }

        let registry = Registry::from_site(&site, &name, &params)?;

        Ok(Self {
            site,
            registry,
            defaults: defaults::load_defaults(),
        })
    }

    pub fn runner(&self, global: &GlobalArgs) -> Box<dyn Runner> {
        if global.dry_run {
            Box::new(RecordingRunner::dry_run())
        } else {
            Box::new(SystemRunner::new(self.defaults.ssh.clone()))
        }
    }
}

fn default_environment(site: &Site) -> invenio_deploy::Result<String> {
    if let Some(name) = &site.default_environment {
        return Ok(name.clone());
    }
    match site.environment_names().as_slice() {
        [only] => Ok(only.clone()),
        names => Err(Error::validation_missing_argument(vec!["env".to_string()])
            .with_hint(format!("Select one with -e: {}", names.join(", ")))),
    }
}

/// Console for confirmations: `--yes` accepts everything, a terminal asks,
/// anything else refuses.
pub fn console(global: &GlobalArgs) -> Box<dyn Console> {
    if global.yes {
        Box::new(AssumeYes)
    } else if crate::tty::is_stdin_tty() {
        Box::new(crate::tty::TerminalConsole)
    } else {
        Box::new(NoConsole)
    }
}

pub mod env;
pub mod group;
pub mod run;
pub mod tasks;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (invenio_deploy::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Group(args) => dispatch!(args, global, group),
        crate::Commands::Tasks(args) => dispatch!(args, global, tasks),
        crate::Commands::Env(args) => dispatch!(args, global, env),
    }
}
