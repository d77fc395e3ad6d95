//! Virtualenv lifecycle: create, drop, archive, restore and requirements.
//!
//! These tasks have no role and run on the machine the tool runs on.

use std::path::Path;

use crate::context::{TaskContext, WriteOptions};
use crate::error::Result;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_arg;

use super::system::python_version;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "venv_create",
        summary: "Create virtualenv environment",
        role: None,
        run: venv_create,
    },
    TaskDef {
        name: "venv_drop",
        summary: "Drop virtualenv environment",
        role: None,
        run: venv_drop,
    },
    TaskDef {
        name: "venv_dump",
        summary: "Archive a virtualenv",
        role: None,
        run: venv_dump,
    },
    TaskDef {
        name: "venv_load",
        summary: "Load an archived virtualenv",
        role: None,
        run: venv_load,
    },
    TaskDef {
        name: "venv_requirements",
        summary: "Install Python requirements",
        role: None,
        run: venv_requirements,
    },
];

const DEVSCRIPTS_URL: &str = "https://github.com/tiborsimko/invenio-devscripts.git";
const GIT_NEW_WORKDIR_URL: &str =
    "http://repo.or.cz/w/git.git/blob_plain/HEAD:/contrib/workdir/git-new-workdir";
const ACTIVATE_TEMPLATE: &str = "activate-profile.tpl";
const ACTIVATE_MARK: &str = "ACTIVATE_PROFILE";

/// Parent directory and last component of the installation prefix.
pub fn split_prefix(prefix: &str) -> (String, String) {
    let path = Path::new(prefix.trim_end_matches('/'));
    let dirname = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    (dirname, basename)
}

pub fn archive_file(prefix: &str) -> String {
    let (dirname, basename) = split_prefix(prefix);
    format!("{}/{}.tar.gz", dirname, basename)
}

/// Ask before removing an existing installation; abort when refused.
fn remove_existing(ctx: &TaskContext<'_>) -> Result<bool> {
    let prefix = &ctx.env.prefix;
    if !ctx.exists(prefix, false)? {
        return Ok(false);
    }
    ctx.confirm_or_abort(
        &format!("Remove installation in {} ?", prefix),
        "Cannot continue",
    )?;
    ctx.run(format!("sudo rm -Rf {}", quote_arg(prefix)))?;
    Ok(true)
}

/// Interpreter packages get installed for: the virtualenv's own python when
/// enabled, the configured one otherwise.
fn venv_python(ctx: &TaskContext<'_>) -> String {
    if ctx.env.with_virtualenv {
        format!("{}/bin/python", ctx.env.prefix)
    } else {
        ctx.env.python.clone()
    }
}

fn require_prefix(ctx: &TaskContext<'_>) -> Result<()> {
    if ctx.env.prefix.trim().is_empty() {
        return Err(ctx.abort("CFG_INVENIO_PREFIX is not specified in env."));
    }
    Ok(())
}

// ============================================================================
// Tasks
// ============================================================================

fn venv_create(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    require_prefix(ctx)?;
    let env = ctx.env;
    let prefix = &env.prefix;
    log_status!("venv", "Creating virtualenv in {}...", prefix);

    remove_existing(ctx)?;

    let (dirname, basename) = split_prefix(prefix);
    let dir = quote_arg(&dirname);
    ctx.run(format!("mkdir -p {}", dir))?;
    ctx.run(format!(
        "cd {} && virtualenv -p {} {}",
        dir,
        env.python,
        quote_arg(&basename)
    ))?;

    let pyver = python_version(ctx, &format!("{}/bin/python", prefix))?;
    let site_packages = format!("{}/lib/python{}/site-packages", prefix, pyver);
    let invenio_lib = format!("{}/lib/python/invenio", prefix);
    ctx.run(format!("mkdir -p {}", quote_arg(&invenio_lib)))?;
    ctx.run(format!("mkdir -p {}", quote_arg(&site_packages)))?;
    ctx.run(format!(
        "ln -s {} {}",
        quote_arg(&invenio_lib),
        quote_arg(&format!("{}/invenio", site_packages))
    ))?;

    ctx.write_template(
        &format!("{}/bin/activate", prefix),
        ACTIVATE_TEMPLATE,
        WriteOptions {
            mark: Some(ACTIVATE_MARK),
            ..WriteOptions::default()
        },
    )?;

    if env.with_devscripts {
        log_status!("venv", "Installing invenio-devscripts...");
        let dir = quote_arg(prefix);
        ctx.run(format!("cd {} && git clone {}", dir, DEVSCRIPTS_URL))?;
        ctx.run(format!("cd {} && mv invenio-devscripts/* bin/", dir))?;
    }

    if env.with_workdir {
        log_status!("venv", "Installing git-new-workdir...");
        let script = quote_arg(&format!("{}/bin/git-new-workdir", prefix));
        ctx.run(format!(
            "wget -O {} \"{}\"",
            script, GIT_NEW_WORKDIR_URL
        ))?;
        ctx.run(format!("chmod +x {}", script))?;
    }

    let ooffice = quote_arg(&format!("{}/var/tmp/ooffice-tmp-files", prefix));
    ctx.run(format!("mkdir -p {}", ooffice))?;
    ctx.run(format!("sudo chown -R nobody {}", ooffice))?;
    ctx.run(format!("sudo chmod -R 755 {}", ooffice))?;
    Ok(())
}

fn venv_drop(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    require_prefix(ctx)?;
    log_status!("venv", "Dropping virtualenv in {}...", ctx.env.prefix);
    if !remove_existing(ctx)? {
        log_status!(
            "venv",
            "Nothing to remove - {} does not exists...",
            ctx.env.prefix
        );
    }
    Ok(())
}

fn venv_dump(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let prefix = &ctx.env.prefix;
    log_status!("venv", "Creating archive of virtualenv in {}...", prefix);

    let (dirname, basename) = split_prefix(prefix);
    let archive = archive_file(prefix);
    if ctx.exists(&archive, false)? {
        ctx.confirm_or_abort("Existing archive already exists - remove?", "Cannot continue")?;
        ctx.run(format!("rm -Rf {}", quote_arg(&archive)))?;
    }

    ctx.run(format!(
        "cd {} && tar -cvzf {} {}",
        quote_arg(&dirname),
        quote_arg(&format!("{}.tar.gz", basename)),
        quote_arg(&basename)
    ))?;
    Ok(())
}

fn venv_load(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("venv", "Loading archived virtualenv...");
    let (dirname, basename) = split_prefix(&ctx.env.prefix);

    if !ctx.exists(&archive_file(&ctx.env.prefix), false)? {
        return Err(ctx.abort("Archived virtualenv does not exists - cannot continue"));
    }

    remove_existing(ctx)?;
    ctx.run(format!(
        "cd {} && tar -xvzf {}",
        quote_arg(&dirname),
        quote_arg(&format!("{}.tar.gz", basename))
    ))?;
    Ok(())
}

/// `pip install -r` line, inside the virtualenv when enabled.
fn pip_install(ctx: &TaskContext<'_>, reqpath: &str) -> String {
    let mut cmds = Vec::new();
    if ctx.env.with_virtualenv {
        cmds.push(format!(
            ". {}",
            quote_arg(&format!("{}/bin/activate", ctx.env.prefix))
        ));
    }
    cmds.push(format!("pip install -r {}", quote_arg(reqpath)));
    cmds.join(" && ")
}

fn venv_requirements(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let env = ctx.env;
    let has_repo_requirements = env.repos.iter().any(|r| !r.requirements.is_empty());
    if env.requirements.is_empty() && !has_repo_requirements {
        log_status!("venv", "No requirements defined...");
        return Ok(());
    }

    log_status!("venv", "Installing requirements...");
    let pyver = python_version(ctx, &venv_python(ctx))?;

    for repo in &env.repos {
        let checkout = env.repo_path(&repo.name, true);
        for reqfile in &repo.requirements {
            let reqpath = format!("{}/{}", checkout, reqfile);
            if !ctx.exists(&reqpath, false)? {
                log_status!("warn", "Requirements file {} not found, skipping", reqpath);
                continue;
            }
            log_status!("venv", "Installing requirements from {}...", reqpath);
            ctx.run(pip_install(ctx, &reqpath))?;
        }
    }

    for reqfile in &env.requirements {
        let reqfile = ctx.render(reqfile, &[]);
        let basename = Path::new(&reqfile)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| reqfile.clone());
        let reqpath = format!("{}/{}", env.prefix, basename);

        log_status!("venv", "Writing requirements to {}...", reqpath);
        ctx.write_template(
            &reqpath,
            &reqfile,
            WriteOptions {
                extras: &[
                    ("reqpath", reqpath.clone()),
                    ("reqfile", reqfile.clone()),
                    ("pyver", pyver.clone()),
                ],
                ..WriteOptions::default()
            },
        )?;

        log_status!("venv", "Installing requirements from {}...", reqpath);
        ctx.run(pip_install(ctx, &reqpath))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_split_and_archive() {
        assert_eq!(
            split_prefix("/home/me/envs/atlantis/"),
            ("/home/me/envs".to_string(), "atlantis".to_string())
        );
        assert_eq!(archive_file("/opt/invenio"), "/opt/invenio.tar.gz");
    }
}
