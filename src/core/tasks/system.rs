//! Host preparation: SELinux, LibreOffice, crontabs, file copies, and the
//! OS and Python version probes other tasks depend on.

use regex::Regex;
use std::sync::LazyLock;

use crate::context::{TaskContext, WriteOptions};
use crate::env::Role;
use crate::error::Result;
use crate::executor::Cmd;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::quote_arg;

use super::site_file;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "selinux_prepare",
        summary: "Make SELinux permissive (SLC5)",
        role: Some(Role::Web),
        run: selinux_prepare,
    },
    TaskDef {
        name: "libreoffice_prepare",
        summary: "Set up LibreOffice document conversion",
        role: Some(Role::Web),
        run: libreoffice_prepare,
    },
    TaskDef {
        name: "crontab_install",
        summary: "Install crontab on backend server",
        role: Some(Role::Backend),
        run: crontab_install,
    },
    TaskDef {
        name: "crontab_uninstall",
        summary: "Uninstall crontab on backend server",
        role: Some(Role::Backend),
        run: crontab_uninstall,
    },
    TaskDef {
        name: "crontab_show",
        summary: "Show installed crontab on backend server",
        role: Some(Role::Backend),
        run: crontab_show,
    },
    TaskDef {
        name: "copy_files",
        summary: "Copy the files listed in settings.system.copy",
        role: Some(Role::Web),
        run: copy_files,
    },
    TaskDef {
        name: "slc_version",
        summary: "Detect the Scientific Linux CERN release",
        role: Some(Role::Web),
        run: slc_version_task,
    },
    TaskDef {
        name: "python_version",
        summary: "Detect the version of the environment's python",
        role: None,
        run: python_version_task,
    },
];

static SLC_RELEASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Scientific Linux CERN SLC release ([0-9])\.([0-9]) \([A-Za-z\-_ ]+\)").unwrap()
});

static PYTHON_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)\.([0-9]+)$").unwrap());

/// Version used for paths when a dry run cannot probe the interpreter.
const DRY_RUN_PYTHON_VERSION: &str = "X.Y";

// ============================================================================
// Probes
// ============================================================================

/// Parse `/etc/redhat-release` content.
pub fn parse_slc_release(text: &str) -> Option<(u32, u32)> {
    let caps = SLC_RELEASE.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Scientific Linux CERN release of the target, `None` on other systems.
pub fn slc_version(ctx: &TaskContext<'_>) -> Result<Option<(u32, u32)>> {
    let raw = ctx.probe("slc_version", || {
        let output = ctx.exec(Cmd::new("cat /etc/redhat-release").warn_only().quiet())?;
        Ok(parse_slc_release(&output.stdout).map(|(major, minor)| format!("{}.{}", major, minor)))
    })?;
    Ok(raw.as_deref().and_then(|v| parse_slc_release_short(v)))
}

fn parse_slc_release_short(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Whether the target runs SLC older than 6.
pub fn is_old_slc(ctx: &TaskContext<'_>) -> Result<bool> {
    Ok(matches!(slc_version(ctx)?, Some((major, _)) if major < 6))
}

/// `major.minor` version of `interpreter` on the target.
pub fn python_version(ctx: &TaskContext<'_>, interpreter: &str) -> Result<String> {
    let key = format!("python_version:{}", interpreter);
    let version = ctx.probe(&key, || {
        let line = format!(
            "{} -c \"import sys;print('%s.%s' % sys.version_info[:2])\"",
            interpreter
        );
        let output = ctx.exec(Cmd::new(line).quiet())?;
        let version = output.stdout.trim().to_string();
        Ok(PYTHON_VERSION.is_match(&version).then_some(version))
    })?;

    match version {
        Some(version) => Ok(version),
        None if !ctx.session.is_live() => Ok(DRY_RUN_PYTHON_VERSION.to_string()),
        None => Err(ctx.abort(format!(
            "Could not determine the version of {}",
            interpreter
        ))),
    }
}

fn slc_version_task(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    match slc_version(ctx)? {
        Some((major, minor)) => log_status!("system", "{}: SLC {}.{}", ctx.target, major, minor),
        None => log_status!("system", "{}: not Scientific Linux CERN", ctx.target),
    }
    Ok(())
}

fn python_version_task(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let version = python_version(ctx, &ctx.env.python)?;
    log_status!("system", "{} is Python {}", ctx.env.python, version);
    Ok(())
}

// ============================================================================
// SELinux and LibreOffice
// ============================================================================

fn selinux_prepare(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    if !is_old_slc(ctx)? {
        return Ok(());
    }
    ctx.sudo("/usr/sbin/setenforce Permissive")?;
    ctx.sudo(
        "sed -e 's/^SELINUX=enforcing$/SELINUX=permissive/g' < /etc/selinux/config > ~/selinux_config.new",
    )?;
    ctx.sudo("cp ~/selinux_config.new /etc/selinux/config && rm ~/selinux_config.new")?;
    Ok(())
}

fn libreoffice_prepare(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let prefix = &ctx.env.prefix;
    let user = &ctx.env.invenio_user;
    let unoconv = format!("NOPASSWD: {}/bin/inveniounoconv", prefix);

    if is_old_slc(ctx)? && !ctx.contains("/etc/sudoers", &unoconv, true)? {
        ctx.sed(
            "/etc/sudoers",
            &format!("^({}\\s+ALL=.+)$", user),
            &format!("\\1, (nobody) {}", unoconv),
            true,
        )?;
    }

    let tmp = quote_arg(&format!("{}/var/tmp/ooffice-tmp-files", prefix));
    ctx.sudo(format!("mkdir -p {}", tmp))?;
    ctx.sudo(format!("chown -R nobody {}", tmp))?;
    ctx.sudo(format!("chmod -R 755 {}", tmp))?;
    ctx.sudo_as(format!("{}/bin/inveniocfg --check-openoffice", prefix), user)?;
    Ok(())
}

// ============================================================================
// Crontab
// ============================================================================

fn crontab_install(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let crontab = ctx
        .env
        .settings
        .system
        .crontab
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ctx.abort("No crontab defined for environment."))?;

    let user = &ctx.env.invenio_user;
    let remote = format!("{}/etc/crontab", ctx.env.prefix);
    let local = site_file(ctx, &crontab);

    if local.is_file() {
        ctx.put(&local, &remote, true)?;
    } else if ctx.session.templates.find(&ctx.env.name, &crontab).is_ok() {
        ctx.write_template(
            &remote,
            &crontab,
            WriteOptions {
                use_sudo: true,
                ..WriteOptions::default()
            },
        )?;
    } else {
        return Err(ctx.abort(format!("Crontab file {} does not exists.", local.display())));
    }

    ctx.sudo(format!("chown {}:{} {}", user, user, remote))?;
    ctx.sudo(format!("chmod 644 {}", remote))?;
    ctx.sudo_as(format!("crontab {}", remote), user)?;
    Ok(())
}

fn crontab_uninstall(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(Cmd::new("crontab -r").as_user(ctx.env.invenio_user.clone()).warn_only())?;
    Ok(())
}

fn crontab_show(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    ctx.exec(Cmd::new("crontab -l").as_user(ctx.env.invenio_user.clone()).warn_only())?;
    Ok(())
}

// ============================================================================
// File copies
// ============================================================================

fn copy_files(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let copies = &ctx.env.settings.system.copy;
    if copies.is_empty() {
        log_status!("system", "No files to copy");
        return Ok(());
    }

    for spec in copies {
        let source = site_file(ctx, &ctx.render(&spec.source, &[]));
        if !source.is_file() {
            return Err(ctx.abort(format!("File {} does not exists.", source.display())));
        }

        let destination = ctx.render(&spec.destination, &[]);
        log_status!("system", "Copying {} to {}", source.display(), destination);
        ctx.put(&source, &destination, true)?;

        if let Some(owner) = &spec.owner {
            ctx.sudo(format!("chown {} {}", owner, quote_arg(&destination)))?;
        }
        if let Some(mode) = &spec.mode {
            ctx.sudo(format!("chmod {} {}", mode, quote_arg(&destination)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slc_release() {
        assert_eq!(
            parse_slc_release("Scientific Linux CERN SLC release 5.8 (Boron)\n"),
            Some((5, 8))
        );
        assert_eq!(
            parse_slc_release("Scientific Linux CERN SLC release 6.4 (Carbon)"),
            Some((6, 4))
        );
        assert_eq!(parse_slc_release("CentOS release 6.4 (Final)"), None);
    }
}
