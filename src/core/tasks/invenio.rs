//! Invenio configuration and database setup through `inveniocfg`.

use crate::context::{TaskContext, WriteOptions};
use crate::env::Role;
use crate::error::Result;
use crate::executor::Cmd;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::{escape_double_quote_content, quote_arg};

use super::mysql::escape_sql;
use super::site_file;
use super::system::is_old_slc;

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "invenio_conf",
        summary: "Upload and update Invenio configuration",
        role: Some(Role::Web),
        run: invenio_conf,
    },
    TaskDef {
        name: "invenio_updateconf",
        summary: "Update Invenio configuration, optionally pointing it at host",
        role: Some(Role::Web),
        run: invenio_updateconf,
    },
    TaskDef {
        name: "invenio_createdb",
        summary: "Create Invenio tables and Apache configuration",
        role: Some(Role::Web),
        run: invenio_createdb,
    },
    TaskDef {
        name: "invenio_upgrade",
        summary: "Run Invenio upgrader",
        role: Some(Role::Web),
        run: invenio_upgrade,
    },
    TaskDef {
        name: "invenio_reset_adminpw",
        summary: "Reset the admin password to empty",
        role: Some(Role::Web),
        run: invenio_reset_adminpw,
    },
    TaskDef {
        name: "invenio_fix_filelinks",
        summary: "Rewrite fulltext links after moving hosts",
        role: Some(Role::Web),
        run: invenio_fix_filelinks,
    },
    TaskDef {
        name: "invenio_create_demosite",
        summary: "Create demo site and load demo records",
        role: Some(Role::Web),
        run: invenio_create_demosite,
    },
    TaskDef {
        name: "invenio_clean",
        summary: "Clean Invenio installation",
        role: Some(Role::Web),
        run: invenio_clean,
    },
];

const ADMIN_RESET_SQL: &str =
    "UPDATE user SET password=AES_ENCRYPT(email,'') WHERE nickname='admin';";

fn inveniocfg(ctx: &TaskContext<'_>, options: &str) -> Result<()> {
    ctx.as_app_user(format!("{}/bin/inveniocfg {}", ctx.env.prefix, options))?;
    Ok(())
}

/// Pipe SQL into the installation's `dbexec`.
pub fn dbexec(ctx: &TaskContext<'_>, sql: &str) -> Result<()> {
    ctx.as_app_user(format!(
        "echo \"{}\" | {}",
        escape_double_quote_content(sql),
        quote_arg(&format!("{}/bin/dbexec", ctx.env.prefix))
    ))?;
    Ok(())
}

pub fn reset_admin_password(ctx: &TaskContext<'_>) -> Result<()> {
    log_status!("invenio", "Resetting Invenio admin password...");
    dbexec(ctx, ADMIN_RESET_SQL)
}

/// Sed replacement for a `KEY = value` line of `invenio-local.conf`.
pub fn cfg_option_edit(option: &str, value: &str) -> (String, String) {
    (format!("^({}\\s*=).+$", option), format!("\\1 {}", value))
}

// ============================================================================
// Configuration upload
// ============================================================================

/// Upload `invenio-local.conf`: the plain file named by
/// `settings.invenio.conffile`, or the rendered configuration template.
/// Returns the remote path.
pub fn upload_conf(ctx: &TaskContext<'_>) -> Result<String> {
    let remote = format!("{}/etc/invenio-local.conf", ctx.env.prefix);
    let user = &ctx.env.invenio_user;
    let use_sudo = ctx.login_user() != *user;

    match ctx.env.settings.invenio.conffile.as_deref().filter(|c| !c.is_empty()) {
        Some(conffile) => {
            let local = site_file(ctx, conffile);
            if !local.is_file() {
                return Err(ctx.abort(format!(
                    "Configuration file {} does not exists.",
                    local.display()
                )));
            }
            log_status!("invenio", "Uploading {} to {}...", local.display(), remote);
            ctx.put(&local, &remote, use_sudo)?;
        }
        None => {
            ctx.write_template(
                &remote,
                &ctx.env.conf,
                WriteOptions {
                    use_sudo,
                    ..WriteOptions::default()
                },
            )?;
        }
    }

    if use_sudo {
        ctx.sudo(format!("chown {}:{} {}", user, user, remote))?;
    }
    ctx.exec(Cmd::new(format!("chmod 644 {}", remote)).use_sudo(use_sudo))?;
    Ok(remote)
}

// ============================================================================
// Tasks
// ============================================================================

fn invenio_conf(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("invenio", "Updating invenio-local.conf...");
    upload_conf(ctx)?;
    inveniocfg(ctx, "--update-all")
}

fn invenio_updateconf(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let remote = upload_conf(ctx)?;

    if let Some(host) = args.arg(0, "host").filter(|h| !h.is_empty()) {
        let use_sudo = ctx.login_user() != ctx.env.invenio_user;
        for (option, value) in [
            ("CFG_SITE_URL", format!("http://{}", host)),
            ("CFG_SITE_SECURE_URL", format!("https://{}", host)),
        ] {
            let (before, after) = cfg_option_edit(option, &value);
            ctx.sed(&remote, &before, &after, use_sudo)?;
        }
    }

    inveniocfg(ctx, "--update-all")
}

fn invenio_createdb(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("invenio", "Creating Invenio tables...");
    inveniocfg(ctx, "--create-tables")?;
    inveniocfg(ctx, "--create-apache-conf")?;

    if is_old_slc(ctx)? {
        let apache = format!("{}/etc/apache", ctx.env.prefix);
        for conf in ["invenio-apache-vhost.conf", "invenio-apache-vhost-ssl.conf"] {
            ctx.comment(&format!("{}/{}", apache, conf), "WSGIImportScript", true)?;
        }
    }
    Ok(())
}

fn invenio_upgrade(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("invenio", "Upgrading Invenio...");
    inveniocfg(ctx, "--upgrade")
}

fn invenio_reset_adminpw(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    reset_admin_password(ctx)
}

fn invenio_fix_filelinks(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let old_host = args.required(0, "old_host")?;
    let new_host = args.arg(1, "new_host").unwrap_or(&ctx.env.hostname);

    log_status!("invenio", "Rewriting file links from {} to {}...", old_host, new_host);
    let old = escape_sql(old_host);
    dbexec(
        ctx,
        &format!(
            "UPDATE bib85x SET value=REPLACE(value, '{}', '{}') WHERE value LIKE '%{}%';",
            old,
            escape_sql(new_host),
            old
        ),
    )
}

fn invenio_create_demosite(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    log_status!("invenio", "Creating demo site...");
    inveniocfg(ctx, "--create-demo-site --load-demo-records")
}

fn invenio_clean(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let prefix = &ctx.env.prefix;
    ctx.confirm_or_abort(
        &format!("Remove installation in {} ?", prefix),
        "Cannot continue",
    )?;
    ctx.sudo(format!("rm -Rf {}", quote_arg(prefix)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_option_keeps_single_equals() {
        let (before, after) = cfg_option_edit("CFG_SITE_URL", "http://example.org");
        assert_eq!(before, "^(CFG_SITE_URL\\s*=).+$");
        assert_eq!(after, "\\1 http://example.org");
    }
}
