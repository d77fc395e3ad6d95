//! Celery worker init script and service control.

use crate::context::{TaskContext, WriteOptions};
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

use super::write_optional_template;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "celery_initd",
        summary: "Upload and update celeryd init script",
        role: Some(Role::Workers),
        run: celery_initd,
    },
    TaskDef {
        name: "celery_start",
        summary: "Start Celery",
        role: Some(Role::Workers),
        run: celery_start,
    },
    TaskDef {
        name: "celery_stop",
        summary: "Stop Celery",
        role: Some(Role::Workers),
        run: celery_stop,
    },
    TaskDef {
        name: "celery_restart",
        summary: "Restart Celery",
        role: Some(Role::Workers),
        run: celery_restart,
    },
];

const TEMPLATE: &str = "celeryd";

fn init_script(ctx: &TaskContext<'_>) -> String {
    format!("{}/celeryd", ctx.defaults().services.init_d)
}

fn celery_initd(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("celery", "Creating and configuring celery init.d script...");
    let remote = init_script(ctx);

    write_optional_template(
        ctx,
        &remote,
        TEMPLATE,
        WriteOptions {
            use_sudo: true,
            ..WriteOptions::default()
        },
    )?;
    ctx.sudo(format!("chmod a+x {}", remote))?;
    Ok(())
}

fn celery_start(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.sudo(format!("{} start", init_script(ctx)))?;
    Ok(())
}

fn celery_stop(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.sudo(format!("{} stop", init_script(ctx)))?;
    Ok(())
}

fn celery_restart(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.sudo(format!("{} restart", init_script(ctx)))?;
    Ok(())
}
