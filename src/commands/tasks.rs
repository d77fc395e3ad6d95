use clap::Args;
use glob_match::glob_match;
use serde::Serialize;

use invenio_deploy::console::NoConsole;
use invenio_deploy::task::TaskSummary;
use invenio_deploy::{RecordingRunner, Session};

use super::{CmdResult, GlobalArgs, Workspace};

#[derive(Args)]
pub struct TasksArgs {
    /// Only list tasks matching a glob (mysql_*, *_conf)
    pattern: Option<String>,
}

#[derive(Default, Serialize)]
pub struct TasksOutput {
    command: String,
    environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    tasks: Vec<TaskSummary>,
}

pub fn run(args: TasksArgs, global: &GlobalArgs) -> CmdResult<TasksOutput> {
    let workspace = Workspace::load(global)?;
    let runner = RecordingRunner::dry_run();
    let session = Session::new(&workspace.site, &workspace.registry, &runner, &NoConsole);

    let tasks = session
        .task_list()?
        .into_iter()
        .filter(|t| match &args.pattern {
            Some(pattern) => glob_match(pattern, &t.name),
            None => true,
        })
        .collect();

    Ok((
        TasksOutput {
            command: "tasks".to_string(),
            environment: workspace.registry.active()?.name.clone(),
            pattern: args.pattern,
            tasks,
        },
        0,
    ))
}
