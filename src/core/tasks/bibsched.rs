//! BibSched (Invenio task scheduler) control.

use crate::context::TaskContext;
use crate::env::Role;
use crate::error::Result;
use crate::executor::Cmd;
use crate::task::{TaskArgs, TaskDef};

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "bibsched_start",
        summary: "Start bibsched",
        role: Some(Role::Backend),
        run: bibsched_start,
    },
    TaskDef {
        name: "bibsched_stop",
        summary: "Stop bibsched",
        role: Some(Role::Backend),
        run: bibsched_stop,
    },
    TaskDef {
        name: "bibsched_halt",
        summary: "Halt bibsched",
        role: Some(Role::Backend),
        run: bibsched_halt,
    },
    TaskDef {
        name: "bibsched_status",
        summary: "Bibsched status",
        role: Some(Role::Backend),
        run: bibsched_status,
    },
    TaskDef {
        name: "bibsched_schedule",
        summary: "Schedule the configured bibsched tasks",
        role: Some(Role::Backend),
        run: bibsched_schedule,
    },
    TaskDef {
        name: "bibsched_clear_schedule",
        summary: "Clear all bibsched schedule tasks",
        role: Some(Role::Backend),
        run: bibsched_clear_schedule,
    },
];

/// Status line printed while the queue runs automatically.
pub const RUNNING_MARKER: &str = "BibSched queue running mode: AUTOMATIC";

fn bin(ctx: &TaskContext<'_>, tool: &str) -> String {
    format!("{}/bin/{}", ctx.env.prefix, tool)
}

fn bibsched(ctx: &TaskContext<'_>, action: &str) -> Cmd {
    Cmd::new(format!("{} {}", bin(ctx, "bibsched"), action)).as_user(ctx.env.invenio_user.clone())
}

fn bibsched_start(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(bibsched(ctx, "start"))?;
    Ok(())
}

fn bibsched_stop(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(bibsched(ctx, "stop"))?;
    Ok(())
}

fn bibsched_halt(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(bibsched(ctx, "halt").warn_only())?;
    Ok(())
}

fn bibsched_status(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(bibsched(ctx, "status"))?;
    Ok(())
}

fn bibsched_schedule(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    for task in &ctx.env.settings.bibsched.schedule {
        let cmd = Cmd::new(bin(ctx, task))
            .as_user(ctx.env.invenio_user.clone())
            .warn_only();
        ctx.exec(cmd)?;
    }
    Ok(())
}

fn bibsched_clear_schedule(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    if is_running(ctx)? {
        bibsched_halt(ctx, &TaskArgs::new())?;
    }

    let cmd = Cmd::new(format!("echo \"DELETE FROM schTASK;\" | {}", bin(ctx, "dbexec")))
        .as_user(ctx.env.invenio_user.clone());
    ctx.exec(cmd)?;
    Ok(())
}

/// Whether the bibsched queue runs in automatic mode.
pub fn is_running(ctx: &TaskContext<'_>) -> Result<bool> {
    let output = ctx.exec(bibsched(ctx, "status").warn_only().quiet())?;
    Ok(output.stdout.contains(RUNNING_MARKER))
}
