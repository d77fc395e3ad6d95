//! Multi-step tasks: bootstrap, install, dump, load and drop.
//!
//! Each step is a full task invocation, so it runs on the hosts of its own
//! role. Unless `quiet` is set, every step is confirmed first.

use crate::context::TaskContext;
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "bootstrap",
        summary: "Bootstrap Invenio installation (with_db, quiet, repo=ref...)",
        role: None,
        run: bootstrap,
    },
    TaskDef {
        name: "install",
        summary: "Install changes (quiet, repo=ref...)",
        role: None,
        run: install,
    },
    TaskDef {
        name: "dump",
        summary: "Archive installation",
        role: None,
        run: dump_all,
    },
    TaskDef {
        name: "load",
        summary: "Load archived installation",
        role: None,
        run: load_all,
    },
    TaskDef {
        name: "drop",
        summary: "Remove installation",
        role: None,
        run: drop_all,
    },
];

/// Keywords consumed by the compound tasks themselves.
const OWN_KEYWORDS: &[&str] = &["with_db", "quiet", "quite"];

/// `quiet` flag; the historical `quite` spelling is accepted too.
pub fn quiet_flag(args: &TaskArgs, index: usize, default: bool) -> Result<bool> {
    if args.get("quite").is_some() {
        return args.flag(usize::MAX, "quite", default);
    }
    args.flag(index, "quiet", default)
}

/// Runs steps, asking before each one unless quiet.
struct Steps<'c, 'a> {
    ctx: &'c TaskContext<'a>,
    quiet: bool,
}

impl Steps<'_, '_> {
    fn run(&self, name: &str, args: TaskArgs) -> Result<()> {
        if !self.quiet && !self.ctx.confirm(&format!("Run step {}?", name), true)? {
            log_status!("compound", "Skipping {}", name);
            return Ok(());
        }
        self.ctx.execute_with(name, args)
    }
}

/// `repo=ref` keywords forwarded to `repo_update`.
fn repo_refs(args: &TaskArgs) -> TaskArgs {
    args.keywords_except(OWN_KEYWORDS)
        .into_iter()
        .fold(TaskArgs::new(), |acc, (k, v)| acc.with_keyword(k, v))
}

fn targets_key(key: &str) -> TaskArgs {
    TaskArgs::new().with_keyword("targets_key", key)
}

fn bootstrap(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let with_db = args.flag(0, "with_db", true)?;
    let steps = Steps {
        ctx,
        quiet: quiet_flag(args, 1, false)?,
    };

    if with_db {
        if ctx.env.database.drop_allowed {
            steps.run("mysql_dropdb", TaskArgs::new())?;
        } else {
            log_status!(
                "warn",
                "Skipping mysql_dropdb: database.drop_allowed is false for {}",
                ctx.env.name
            );
        }
        steps.run("mysql_createdb", TaskArgs::new())?;
    }
    steps.run("venv_create", TaskArgs::new())?;
    steps.run("repo_update", repo_refs(args))?;
    steps.run("venv_requirements", TaskArgs::new())?;
    steps.run("repo_install", targets_key("bootstrap_targets"))?;
    steps.run("invenio_conf", TaskArgs::new())?;
    if ctx.env.with_devserver {
        steps.run("devserver_conf", TaskArgs::new())?;
    }
    if with_db {
        steps.run("invenio_createdb", TaskArgs::new())?;
    }
    Ok(())
}

fn install(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let steps = Steps {
        ctx,
        quiet: quiet_flag(args, 0, false)?,
    };

    steps.run("repo_update", repo_refs(args))?;
    steps.run("repo_install", targets_key("deploy_targets"))?;
    steps.run("invenio_conf", TaskArgs::new())?;
    steps.run("invenio_upgrade", TaskArgs::new())?;
    Ok(())
}

fn dump_all(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.execute_with("mysql_dump", TaskArgs::new())?;
    ctx.execute_with("venv_dump", TaskArgs::new())
}

fn load_all(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.execute_with("venv_load", TaskArgs::new())?;
    ctx.execute_with("mysql_load", TaskArgs::new())
}

fn drop_all(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.execute_with("venv_drop", TaskArgs::new())?;
    ctx.execute_with("mysql_dropdb", TaskArgs::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskInvocation;

    #[test]
    fn quiet_accepts_both_spellings() {
        let args = TaskInvocation::parse("bootstrap:quite=yes").unwrap().args;
        assert!(quiet_flag(&args, 1, false).unwrap());

        let args = TaskInvocation::parse("bootstrap:true,true").unwrap().args;
        assert!(quiet_flag(&args, 1, false).unwrap());

        let args = TaskInvocation::parse("bootstrap").unwrap().args;
        assert!(!quiet_flag(&args, 1, false).unwrap());
    }

    #[test]
    fn repo_refs_drop_own_keywords() {
        let args = TaskInvocation::parse("bootstrap:quiet=1,with_db=0,invenio=maint-1.1")
            .unwrap()
            .args;
        assert_eq!(
            repo_refs(&args).keywords(),
            &[("invenio".to_string(), "maint-1.1".to_string())]
        );
    }
}
