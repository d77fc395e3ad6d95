use clap::Args;
use serde::Serialize;

use invenio_deploy::{log_status, CommandRecord, Session};

use super::{CmdResult, GlobalArgs, Workspace};

#[derive(Args)]
pub struct RunArgs {
    /// Tasks to run in order, with arguments: mysql_createdb repo_update:invenio=maint-1.1
    #[arg(required = true, value_name = "TASK")]
    tasks: Vec<String>,
}

#[derive(Default, Serialize)]
pub struct RunOutput {
    command: String,
    environment: String,
    instance: String,
    tasks: Vec<String>,
    dry_run: bool,
    started_at: String,
    finished_at: String,
    commands: Vec<CommandRecord>,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let workspace = Workspace::load(global)?;
    let runner = workspace.runner(global);
    let console = super::console(global);
    let session = Session::new(
        &workspace.site,
        &workspace.registry,
        runner.as_ref(),
        console.as_ref(),
    )
    .with_defaults(workspace.defaults.clone());

    let env = workspace.registry.active()?;
    let started_at = chrono::Utc::now().to_rfc3339();

    for spec in &args.tasks {
        log_status!("run", "{} ({})", spec, env.name);
        session.run_task(spec)?;
    }

    Ok((
        RunOutput {
            command: "run".to_string(),
            environment: env.name.clone(),
            instance: env.instance.clone(),
            tasks: args.tasks,
            dry_run: global.dry_run,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            commands: session.take_report(),
        },
        0,
    ))
}
