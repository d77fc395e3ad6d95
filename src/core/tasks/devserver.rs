//! Development server configuration.
//!
//! `invenio-devserver` (`serve`, `mailserve`) serves the pre-Flask Invenio
//! versions and reads `config_local.py` from the virtualenv's
//! site-packages. Flask based versions use `bin/rundevserver.py` instead.

use crate::context::{TaskContext, WriteOptions};
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

use super::system::python_version;
use super::write_optional_template;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "devserver_conf",
        summary: "Render and update invenio-devserver configuration",
        role: None,
        run: devserver_conf,
    },
    TaskDef {
        name: "devserver_install_flask",
        summary: "Install a Flask devserver",
        role: None,
        run: devserver_install_flask,
    },
];

const CONFIG_TEMPLATE: &str = "config_local.py.tpl";
const FLASK_TEMPLATE: &str = "rundevserver.py.tpl";

fn devserver_conf(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("devserver", "Configuring invenio-devserver...");
    let pyver = python_version(ctx, &ctx.env.python)?;
    let remote = format!(
        "{}/lib/python{}/site-packages/config_local.py",
        ctx.env.prefix, pyver
    );

    log_status!("devserver", "Writing config_local.py to {}...", remote);
    write_optional_template(
        ctx,
        &remote,
        CONFIG_TEMPLATE,
        WriteOptions {
            extras: &[("pyver", pyver.clone())],
            ..WriteOptions::default()
        },
    )?;
    Ok(())
}

fn devserver_install_flask(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("devserver", "Configuring Flask devserver...");
    let remote = format!("{}/bin/rundevserver.py", ctx.env.prefix);

    log_status!("devserver", "Writing rundevserver.py to {}...", remote);
    if write_optional_template(ctx, &remote, FLASK_TEMPLATE, WriteOptions::default())? {
        ctx.run(format!("chmod a+x {}", remote))?;
    }
    Ok(())
}
