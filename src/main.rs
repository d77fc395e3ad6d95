use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{env, group, run, tasks};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "invdeploy")]
#[command(version = VERSION)]
#[command(about = "Install, configure and operate Invenio sites")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more tasks in the selected environment
    Run(run::RunArgs),
    /// Run a task group (prepare, deploy, clean, ...)
    Group(group::GroupArgs),
    /// List the tasks available in the selected environment
    #[command(visible_alias = "list")]
    Tasks(tasks::TasksArgs),
    /// Inspect environments and their settings
    Env(env::EnvArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command, &cli.global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
        return std::process::ExitCode::from(exit_code_to_u8(1));
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
