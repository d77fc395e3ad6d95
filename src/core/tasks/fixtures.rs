//! Test fixtures: snapshot an installation's state and database under
//! `<prefix>/tests` and restore it later.

use crate::context::TaskContext;
use crate::env::Role;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_arg;

use super::compound::quiet_flag;
use super::invenio::{dbexec, reset_admin_password};
use super::{mysql, repo};

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "test_clean",
        summary: "Clean Invenio logs and temporary files",
        role: Some(Role::Web),
        run: test_clean,
    },
    TaskDef {
        name: "test_dump",
        summary: "Dump a test environment",
        role: Some(Role::Web),
        run: test_dump,
    },
    TaskDef {
        name: "test_reset_admin",
        summary: "Reset admin password",
        role: Some(Role::Web),
        run: test_reset_admin,
    },
    TaskDef {
        name: "test_load",
        summary: "Load test environment (repo, quiet)",
        role: Some(Role::Web),
        run: test_load,
    },
];

const RSYNC: &str = "rsync --delete -rLptgoDv";

/// Mirror directory `from` into `to`.
fn rsync(from: &str, to: &str) -> String {
    format!("{} {}/ {}/", RSYNC, quote_arg(from), quote_arg(to))
}

fn tests_dir(ctx: &TaskContext<'_>) -> String {
    format!("{}/tests", ctx.env.prefix)
}

fn test_clean(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("fixtures", "Cleaning Invenio installation...");
    let prefix = &ctx.env.prefix;

    let ooffice = format!("{}/var/tmp/ooffice-tmp-files", prefix);
    ctx.sudo(format!("rm -Rf {}/*", quote_arg(&ooffice)))?;
    for dir in ["var/tmp-shared", "var/tmp", "var/log", "var/cache"] {
        let dir = format!("{}/{}", prefix, dir);
        ctx.as_app_user(format!("rm -Rf {}/*", quote_arg(&dir)))?;
    }
    dbexec(ctx, "TRUNCATE schTASK;")?;
    dbexec(ctx, "TRUNCATE session;")?;
    Ok(())
}

fn test_dump(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    test_reset_admin(ctx, args)?;
    test_clean(ctx, args)?;

    log_status!("fixtures", "Creating test package...");
    let prefix = &ctx.env.prefix;
    let tests = tests_dir(ctx);

    ctx.as_app_user(format!("rm -Rf {}/", quote_arg(&tests)))?;
    for sub in ["var", "etc"] {
        ctx.as_app_user(format!("mkdir -p {}/", quote_arg(&format!("{}/{}", tests, sub))))?;
    }
    for sub in ["var", "etc"] {
        ctx.sudo(rsync(&format!("{}/{}", prefix, sub), &format!("{}/{}", tests, sub)))?;
    }

    mysql::dump(ctx, Some(&tests))
}

fn test_reset_admin(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    reset_admin_password(ctx)
}

fn test_load(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let selected = args.arg(0, "repo").filter(|r| !r.is_empty());
    let quiet = quiet_flag(args, 1, true)?;
    let step = |name: &str| -> Result<bool> {
        Ok(quiet || ctx.confirm(&format!("Run step {}?", name), true)?)
    };

    let prefix = &ctx.env.prefix;
    let tests = tests_dir(ctx);

    if step("load_files")? {
        log_status!("fixtures", "Loading test package...");
        for sub in ["var", "etc"] {
            ctx.sudo(rsync(&format!("{}/{}", tests, sub), &format!("{}/{}", prefix, sub)))?;
        }
    }

    if step("load_db")? {
        let dumpfile = mysql::dump_file(&tests, &ctx.env.database.name);
        mysql::load(ctx, Some(&dumpfile))?;
    }

    if step("configure_make_install")? {
        repo::all_configure_make(ctx, selected, "deploy_targets")?;
    }
    Ok(())
}
