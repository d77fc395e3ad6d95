use clap::Args;
use serde::Serialize;

use invenio_deploy::{CommandRecord, Session};

use super::{CmdResult, GlobalArgs, Workspace};

#[derive(Args)]
pub struct GroupArgs {
    /// Task group of the environment (prepare, deploy, clean, ...)
    name: String,
}

#[derive(Default, Serialize)]
pub struct GroupOutput {
    command: String,
    environment: String,
    group: String,
    steps: Vec<String>,
    dry_run: bool,
    started_at: String,
    finished_at: String,
    commands: Vec<CommandRecord>,
}

pub fn run(args: GroupArgs, global: &GlobalArgs) -> CmdResult<GroupOutput> {
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
    session.run_group(&args.name)?;

    Ok((
        GroupOutput {
            command: "group".to_string(),
            environment: env.name.clone(),
            steps: env.tasks.get(&args.name).cloned().unwrap_or_default(),
            group: args.name,
            dry_run: global.dry_run,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            commands: session.take_report(),
        },
        0,
    ))
}
