//! MySQL database tasks.
//!
//! Root access uses `mysql -u root -p`, which prompts on the terminal, unless
//! the environment sets `database.root_password`.

use crate::context::TaskContext;
use crate::env::{Database, Role};
use crate::error::Result;
use crate::executor::Cmd;
use crate::task::{TaskArgs, TaskDef};
use crate::utils::shell::{escape_double_quote_content, quote_arg};

pub(crate) const TASKS: &[TaskDef] = &[
    TaskDef {
        name: "mysql_prepare",
        summary: "Start MySQL, enable it at boot and create the dump directory",
        role: Some(Role::Db),
        run: mysql_prepare,
    },
    TaskDef {
        name: "mysql_createdb",
        summary: "Create database and user",
        role: Some(Role::Db),
        run: mysql_createdb,
    },
    TaskDef {
        name: "mysql_dropdb",
        summary: "Drop database and revoke user privileges",
        role: Some(Role::Db),
        run: mysql_dropdb,
    },
    TaskDef {
        name: "mysql_loaddump",
        summary: "Replace the database with a plain SQL dump file",
        role: Some(Role::Db),
        run: mysql_loaddump,
    },
    TaskDef {
        name: "mysql_dump",
        summary: "Dump the database to <outputdir>/<name>.sql.gz",
        role: Some(Role::Db),
        run: mysql_dump,
    },
    TaskDef {
        name: "mysql_load",
        summary: "Load a gzipped dump created by mysql_dump",
        role: Some(Role::Db),
        run: mysql_load,
    },
    TaskDef {
        name: "mysql_copy",
        summary: "Copy the database of another environment",
        role: Some(Role::Db),
        run: mysql_copy,
    },
];

/// Password prompt shown when the environment defines none.
pub const PASSWORD_PROMPT: &str =
    "Enter new MySQL Invenio user password (typing will be visible, default is my123p$ss):";

// ============================================================================
// Tasks
// ============================================================================

fn mysql_prepare(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    let services = &ctx.defaults().services;
    ctx.sudo(format!("{} mysqld start", services.service))?;
    ctx.sudo(format!("{} mysqld on", services.chkconfig))?;

    if ctx.confirm("Secure MySQL installation?", true)? {
        ctx.exec(Cmd::new("/usr/bin/mysql_secure_installation").sudo().interactive())?;
    }

    let dumpdir = &ctx.env.database.dumpdir;
    if !dumpdir.is_empty() {
        let user = &ctx.env.invenio_user;
        let dir = quote_arg(dumpdir);
        ctx.sudo(format!("mkdir -p {}", dir))?;
        ctx.sudo(format!("chown {}:{} {}", user, user, dir))?;
        ctx.sudo(format!("chmod 755 {}", dir))?;
    }
    Ok(())
}

fn mysql_createdb(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    createdb(ctx)
}

fn mysql_dropdb(ctx: &TaskContext<'_>, _args: &TaskArgs) -> Result<()> {
    dropdb(ctx)
}

fn mysql_loaddump(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let dumpfile = args.required(0, "dumpfile")?;
    if !ctx.exists(dumpfile, true)? {
        return Err(ctx.abort(format!("File {} does not exists.", dumpfile)));
    }

    let question = format!(
        "This will erease all data in the existing database. Are you sure you want to load {}?",
        dumpfile
    );
    if !ctx.confirm(&question, false)? {
        return Ok(());
    }

    let db = &ctx.env.database;
    recreate(ctx, db)?;
    ctx.exec(root_cmd(
        ctx,
        &format!("-f {} < {}", db.name, quote_arg(dumpfile)),
    ))?;
    Ok(())
}

fn mysql_dump(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let outputdir = args.arg(0, "outputdir").filter(|d| !d.is_empty());
    dump(ctx, outputdir)
}

fn mysql_load(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let dumpfile = args.arg(0, "dumpfile").filter(|d| !d.is_empty());
    load(ctx, dumpfile)
}

fn mysql_copy(ctx: &TaskContext<'_>, args: &TaskArgs) -> Result<()> {
    let from_env = args.required(0, "from_env")?;
    let source = ctx.session.registry().get(from_env)?;
    let db = &ctx.env.database;
    let src = &source.database;

    let question = format!(
        "This will erease all data in {}. Copy database {} from environment {}?",
        db.name, src.name, from_env
    );
    if !ctx.confirm(&question, false)? {
        return Ok(());
    }

    let source_auth = match &src.password {
        Some(password) => format!("-p{}", quote_arg(password)),
        None => "-p".to_string(),
    };
    let auth = root_auth(db);

    recreate(ctx, db)?;
    let line = format!(
        "mysqldump -h {} -P {} -u {} {} --opt {} | mysql -u root {} {}",
        src.host, src.port, src.user, source_auth, src.name, auth, db.name
    );
    let cmd = with_root_auth(Cmd::new(line), db);
    ctx.exec(match &src.password {
        Some(password) => cmd.secret(quote_arg(password)),
        None => cmd.interactive(),
    })?;
    Ok(())
}

// ============================================================================
// Operations
// ============================================================================

/// Create the database and grant the application user access. The user
/// password is prompted for when the environment does not set one; the
/// answer is kept for templates rendered later in the run.
pub fn createdb(ctx: &TaskContext<'_>) -> Result<()> {
    let db = &ctx.env.database;
    let mysql = &ctx.defaults().mysql;

    let password = match db
        .password
        .clone()
        .or_else(|| ctx.session.remembered("CFG_DATABASE_PASS"))
    {
        Some(password) => password,
        None => {
            let answer = ctx.prompt(PASSWORD_PROMPT, &mysql.default_password)?;
            ctx.session.remember("CFG_DATABASE_PASS", &answer);
            answer
        }
    };

    ctx.exec(root_sql(
        ctx,
        &format!(
            "CREATE DATABASE IF NOT EXISTS {} DEFAULT CHARACTER SET {} COLLATE {}",
            db.name, mysql.charset, mysql.collation
        ),
    ))?;
    let quoted_password = escape_sql(&password);
    ctx.exec(
        root_sql(
            ctx,
            &format!(
                "GRANT ALL PRIVILEGES ON {}.* TO {}@localhost IDENTIFIED BY '{}';",
                db.name, db.user, quoted_password
            ),
        )
        .secret(escape_double_quote_content(&quoted_password)),
    )?;
    ctx.exec(flush_privileges(ctx))?;
    Ok(())
}

/// Drop the database. Refused unless the environment allows it.
pub fn dropdb(ctx: &TaskContext<'_>) -> Result<()> {
    let db = &ctx.env.database;
    if !db.drop_allowed {
        return Err(ctx
            .abort(format!(
                "Dropping database {} is not allowed in environment {}.",
                db.name, ctx.env.name
            ))
            .with_hint("Set database.drop_allowed to true for this environment"));
    }

    ctx.exec(root_sql(ctx, &format!("DROP DATABASE IF EXISTS {}", db.name)))?;
    ctx.exec(root_sql(
        ctx,
        &format!(
            "REVOKE ALL PRIVILEGES ON {}.* FROM {}@localhost",
            db.name, db.user
        ),
    ))?;
    ctx.exec(flush_privileges(ctx))?;
    Ok(())
}

/// Dump the database to `<outputdir>/<name>.sql.gz` (dump directory by
/// default).
pub fn dump(ctx: &TaskContext<'_>, outputdir: Option<&str>) -> Result<()> {
    let db = &ctx.env.database;
    let dir = outputdir.unwrap_or(&db.dumpdir);
    let file = dump_file(dir, &db.name);

    log_status!("mysql", "Dumping database {} to {}...", db.name, file);
    ctx.run(format!("mkdir -p {}", quote_arg(dir)))?;

    let auth = root_auth(db);
    let cmd = Cmd::new(format!(
        "mysqldump -u root {} --opt {} | gzip -c > {}",
        auth,
        db.name,
        quote_arg(&file)
    ));
    ctx.exec(with_root_auth(cmd, db))?;
    Ok(())
}

/// Replace the database with a dump created by [`dump`].
pub fn load(ctx: &TaskContext<'_>, dumpfile: Option<&str>) -> Result<()> {
    let db = &ctx.env.database;
    let file = match dumpfile {
        Some(file) => file.to_string(),
        None => dump_file(&db.dumpdir, &db.name),
    };

    if !ctx.exists(&file, true)? {
        return Err(ctx.abort(format!("File {} does not exists.", file)));
    }

    let question = format!(
        "This will erease all data in the existing database. Are you sure you want to load {}?",
        file
    );
    if !ctx.confirm(&question, false)? {
        return Ok(());
    }

    recreate(ctx, db)?;

    let auth = root_auth(db);
    let reader = if file.ends_with(".gz") {
        format!("gunzip -c {}", quote_arg(&file))
    } else {
        format!("cat {}", quote_arg(&file))
    };
    let cmd = Cmd::new(format!("{} | mysql -u root -f {} {}", reader, auth, db.name));
    ctx.exec(with_root_auth(cmd, db))?;
    Ok(())
}

pub fn dump_file(dir: &str, name: &str) -> String {
    format!("{}/{}.sql.gz", dir.trim_end_matches('/'), name)
}

fn recreate(ctx: &TaskContext<'_>, db: &Database) -> Result<()> {
    let mysql = &ctx.defaults().mysql;
    ctx.exec(root_sql(ctx, &format!("DROP DATABASE IF EXISTS {}", db.name)))?;
    ctx.exec(root_sql(
        ctx,
        &format!(
            "CREATE DATABASE IF NOT EXISTS {} DEFAULT CHARACTER SET {} COLLATE {}",
            db.name, mysql.charset, mysql.collation
        ),
    ))?;
    Ok(())
}

// ============================================================================
// Command builders
// ============================================================================

/// Root password flag; a bare `-p` makes the client prompt for it.
fn root_auth(db: &Database) -> String {
    match &db.root_password {
        Some(password) => format!("-p{}", quote_arg(password)),
        None => "-p".to_string(),
    }
}

/// Mask the root password, or attach the terminal so mysql can ask for it.
fn with_root_auth(cmd: Cmd, db: &Database) -> Cmd {
    match &db.root_password {
        Some(password) => cmd.secret(quote_arg(password)),
        None => cmd.interactive(),
    }
}

fn root_cmd(ctx: &TaskContext<'_>, args: &str) -> Cmd {
    let db = &ctx.env.database;
    let auth = root_auth(db);
    with_root_auth(Cmd::new(format!("mysql -u root {} {}", auth, args)), db)
}

fn root_sql(ctx: &TaskContext<'_>, sql: &str) -> Cmd {
    root_cmd(ctx, &format!("-e \"{}\"", escape_double_quote_content(sql)))
}

fn flush_privileges(ctx: &TaskContext<'_>) -> Cmd {
    let db = &ctx.env.database;
    let auth = root_auth(db);
    with_root_auth(Cmd::new(format!("mysqladmin -u root {} flush-privileges", auth)), db)
}

/// Escape a value for a single-quoted SQL string.
pub fn escape_sql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_sql_quotes() {
        assert_eq!(escape_sql("my123p$ss"), "my123p$ss");
        assert_eq!(escape_sql("it's"), "it\\'s");
    }

    #[test]
    fn root_auth_prompts_without_password() {
        let mut db = Database::default();
        assert_eq!(root_auth(&db), "-p");
        db.root_password = Some("r00t".to_string());
        assert_eq!(root_auth(&db), "-pr00t");
    }

    #[test]
    fn dump_file_name() {
        assert_eq!(dump_file("/opt/invenio/tests/", "atlantis"), "/opt/invenio/tests/atlantis.sql.gz");
    }
}
